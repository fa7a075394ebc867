use crate::system::sort::SortKey;

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Quit,
    Refresh,
    CycleSort,
    SetSort(SortKey),
    ToggleSortDirection,
    ToggleKernelThreads,
    ToggleThreads,
    ZoomIn(u32),
    ZoomOut,
    None,
}

impl Action {
    /// Single-key bindings used by the line-oriented watch loop.
    pub fn from_key(key: char) -> Self {
        match key {
            'q' => Action::Quit,
            'r' => Action::Refresh,
            's' => Action::CycleSort,
            'S' => Action::ToggleSortDirection,
            'k' => Action::ToggleKernelThreads,
            't' => Action::ToggleThreads,
            'z' => Action::ZoomOut,
            'p' => Action::SetSort(SortKey::Pid),
            'c' => Action::SetSort(SortKey::Cpu),
            'm' => Action::SetSort(SortKey::ResidentMemory),
            'n' => Action::SetSort(SortKey::Command),
            _ => Action::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_bindings() {
        assert_eq!(Action::from_key('q'), Action::Quit);
        assert_eq!(Action::from_key('m'), Action::SetSort(SortKey::ResidentMemory));
        assert_eq!(Action::from_key('?'), Action::None);
    }
}
