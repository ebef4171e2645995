use std::fmt;

/// Where a publish run is. Each transition is one step of the composer
/// workflow; `Failed` is reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Start,
    Home,
    ComposerOpen,
    TitleSet,
    BodySet,
    CoverAttempted,
    TagsAttempted,
    Saved,
    Published,
    Done,
    Failed,
}

impl FlowState {
    pub fn is_terminal(self) -> bool {
        matches!(self, FlowState::Done | FlowState::Failed)
    }

    /// The state that follows a successful step. Terminal states and the
    /// save/publish fork have no fixed successor.
    pub fn next(self) -> Option<FlowState> {
        match self {
            FlowState::Start => Some(FlowState::Home),
            FlowState::Home => Some(FlowState::ComposerOpen),
            FlowState::ComposerOpen => Some(FlowState::TitleSet),
            FlowState::TitleSet => Some(FlowState::BodySet),
            FlowState::BodySet => Some(FlowState::CoverAttempted),
            FlowState::CoverAttempted => Some(FlowState::TagsAttempted),
            FlowState::TagsAttempted => None,
            FlowState::Saved | FlowState::Published => Some(FlowState::Done),
            FlowState::Done | FlowState::Failed => None,
        }
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlowState::Start => "start",
            FlowState::Home => "home",
            FlowState::ComposerOpen => "composer-open",
            FlowState::TitleSet => "title-set",
            FlowState::BodySet => "body-set",
            FlowState::CoverAttempted => "cover-attempted",
            FlowState::TagsAttempted => "tags-attempted",
            FlowState::Saved => "saved",
            FlowState::Published => "published",
            FlowState::Done => "done",
            FlowState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_prefix_reaches_the_fork() {
        let mut state = FlowState::Start;
        let mut visited = vec![state];
        while let Some(next) = state.next() {
            state = next;
            visited.push(state);
        }
        assert_eq!(state, FlowState::TagsAttempted);
        assert_eq!(visited.len(), 7);
    }

    #[test]
    fn both_outcomes_finish_in_done() {
        assert_eq!(FlowState::Saved.next(), Some(FlowState::Done));
        assert_eq!(FlowState::Published.next(), Some(FlowState::Done));
        assert!(FlowState::Done.is_terminal());
        assert!(FlowState::Failed.is_terminal());
        assert!(!FlowState::Saved.is_terminal());
    }
}
