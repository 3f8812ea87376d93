use crate::domain::model::PackageState;

impl PackageState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PackageState::Succeeded | PackageState::Failed(_))
    }

    /// Pending → Fetching → Decompressing → Extracting → Succeeded，任何非終態都可進入 Failed
    pub fn can_transition_to(&self, next: PackageState) -> bool {
        use PackageState::*;

        match (self, next) {
            (Succeeded | Failed(_), _) => false,
            (_, Failed(_)) => true,
            (Pending, Fetching)
            | (Fetching, Decompressing)
            | (Decompressing, Extracting)
            | (Extracting, Succeeded) => true,
            _ => false,
        }
    }
}

/// 追蹤單一套件的狀態轉換
#[derive(Debug)]
pub struct PackageProgress {
    label: String,
    state: PackageState,
}

impl PackageProgress {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            state: PackageState::Pending,
        }
    }

    pub fn state(&self) -> PackageState {
        self.state
    }

    /// 不合法的轉換會被拒絕並回傳 false
    pub fn advance(&mut self, next: PackageState) -> bool {
        if !self.state.can_transition_to(next) {
            tracing::warn!(
                "Ignoring illegal transition for {}: {} -> {}",
                self.label,
                self.state,
                next
            );
            return false;
        }

        tracing::debug!("📦 {}: {} -> {}", self.label, self.state, next);
        self.state = next;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::ErrorCategory;

    #[test]
    fn test_happy_path() {
        let mut progress = PackageProgress::new("agent");
        assert!(progress.advance(PackageState::Fetching));
        assert!(progress.advance(PackageState::Decompressing));
        assert!(progress.advance(PackageState::Extracting));
        assert!(progress.advance(PackageState::Succeeded));
        assert!(progress.state().is_terminal());
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut progress = PackageProgress::new("agent");
        assert!(progress.advance(PackageState::Failed(ErrorCategory::Fetch)));
        assert!(!progress.advance(PackageState::Fetching));
        assert!(!progress.advance(PackageState::Succeeded));
        assert_eq!(progress.state(), PackageState::Failed(ErrorCategory::Fetch));
    }

    #[test]
    fn test_stages_cannot_be_skipped() {
        let mut progress = PackageProgress::new("agent");
        assert!(!progress.advance(PackageState::Extracting));
        assert!(!progress.advance(PackageState::Succeeded));
        assert_eq!(progress.state(), PackageState::Pending);
    }

    #[test]
    fn test_pending_can_fail_directly() {
        assert!(PackageState::Pending.can_transition_to(PackageState::Failed(ErrorCategory::Cancelled)));
    }
}
