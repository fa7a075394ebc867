//! Mounted-filesystem usage shared by the statfs-based platforms.

use crate::system::snapshot::FilesystemEntry;

/// Filesystem types that never hold user data on the BSD family.
pub const BSD_PSEUDO_TYPES: &[&str] = &[
    "autofs", "devfs", "fdescfs", "linprocfs", "linsysfs", "nullfs", "procfs",
];

/// Raw `statfs` counters, in blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatfsFields {
    pub type_code: u64,
    pub blocks: u64,
    pub free_blocks: u64,
    pub block_size: u64,
}

/// Usage entry for one mount, or `None` when the filesystem reports no
/// blocks at all (pseudo filesystems, autofs triggers).
pub fn usage_entry(
    mount_point: String,
    source: String,
    fs_type: String,
    fields: StatfsFields,
) -> Option<FilesystemEntry> {
    if fields.blocks == 0 {
        return None;
    }
    let free = fields.free_blocks.min(fields.blocks);
    Some(FilesystemEntry {
        mount_point,
        source,
        fs_type,
        type_code: fields.type_code,
        total_bytes: fields.blocks.saturating_mul(fields.block_size),
        used_bytes: (fields.blocks - free).saturating_mul(fields.block_size),
    })
}

pub fn is_bsd_pseudo(fs_type: &str) -> bool {
    BSD_PSEUDO_TYPES.contains(&fs_type)
}

/// Every mounted filesystem via `getfsstat(2)`.
#[cfg(any(target_os = "macos", target_os = "freebsd"))]
pub fn mounted_filesystems(include_pseudo: bool) -> Vec<FilesystemEntry> {
    use super::fixed_cstr;

    fn text(chars: &[libc::c_char]) -> String {
        let bytes: Vec<u8> = chars.iter().map(|&c| c as u8).collect();
        fixed_cstr(&bytes)
    }

    // SAFETY: a null buffer asks only for the number of mounts.
    let count = unsafe { libc::getfsstat(std::ptr::null_mut(), 0, libc::MNT_NOWAIT) };
    if count <= 0 {
        tracing::warn!("getfsstat reported no mounts");
        return Vec::new();
    }
    // SAFETY: statfs is plain data; an all-zero value is valid.
    let mut buf: Vec<libc::statfs> = vec![unsafe { std::mem::zeroed() }; count as usize];
    let size = buf.len() * std::mem::size_of::<libc::statfs>();
    // SAFETY: `buf` holds `size` writable bytes.
    let filled = unsafe { libc::getfsstat(buf.as_mut_ptr(), size as _, libc::MNT_NOWAIT) };
    if filled <= 0 {
        return Vec::new();
    }
    buf.truncate(filled as usize);

    buf.iter()
        .filter_map(|st| {
            let fs_type = text(&st.f_fstypename);
            if !include_pseudo && is_bsd_pseudo(&fs_type) {
                return None;
            }
            let fields = StatfsFields {
                type_code: st.f_type as u64,
                blocks: st.f_blocks as u64,
                free_blocks: st.f_bfree as u64,
                block_size: st.f_bsize as u64,
            };
            usage_entry(text(&st.f_mntonname), text(&st.f_mntfromname), fs_type, fields)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_block_filesystems_are_skipped() {
        let fields = StatfsFields {
            type_code: 0x9fa0,
            ..Default::default()
        };
        assert!(usage_entry("/proc".into(), "proc".into(), "proc".into(), fields).is_none());
    }

    #[test]
    fn usage_in_bytes() {
        let fields = StatfsFields {
            type_code: 0xef53,
            blocks: 1000,
            free_blocks: 250,
            block_size: 4096,
        };
        let entry = usage_entry("/".into(), "/dev/sda1".into(), "ext4".into(), fields).unwrap();
        assert_eq!(entry.total_bytes, 4_096_000);
        assert_eq!(entry.used_bytes, 750 * 4096);
        assert_eq!(entry.type_code, 0xef53);
    }

    #[test]
    fn free_above_total_does_not_underflow() {
        let fields = StatfsFields {
            type_code: 0,
            blocks: 10,
            free_blocks: 20,
            block_size: 512,
        };
        let entry = usage_entry("/x".into(), "x".into(), "ufs".into(), fields).unwrap();
        assert_eq!(entry.used_bytes, 0);
    }

    #[test]
    fn devfs_is_pseudo() {
        assert!(is_bsd_pseudo("devfs"));
        assert!(!is_bsd_pseudo("zfs"));
    }
}
