//! Which project is selected and which detail pane each project shows

use std::collections::HashMap;

use crate::project::ProjectKey;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Pane {
    #[default]
    Configuration,
    Log,
}

impl Pane {
    pub fn class(&self) -> &'static str {
        match self {
            Pane::Configuration => "configure",
            Pane::Log => "log",
        }
    }
}

/// Snapshot handed to rendering
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CurrentView {
    pub selected: Option<ProjectKey>,
    /// Pane of the selected project, if any
    pub pane: Option<Pane>,
}

/// Selection and pane state.
///
/// Each project keeps the pane last chosen for it. The pane last chosen for
/// the selected project also carries over when another project is selected,
/// so switching from a project showing its log lands on the other project's
/// log without rewriting what that project had stored. For the selected
/// project the more recent of the two choices wins.
#[derive(Debug, Default)]
pub struct ViewState {
    selected: Option<ProjectKey>,
    panes: HashMap<ProjectKey, Choice>,
    shown: Choice,
    /// Orders pane choices; 0 is the implicit default
    next_seq: u64,
}

#[derive(Clone, Copy, Debug, Default)]
struct Choice {
    pane: Pane,
    seq: u64,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select_project(&mut self, key: &ProjectKey) {
        self.selected = Some(key.clone());
    }

    pub fn select_pane(&mut self, key: &ProjectKey, pane: Pane) {
        self.next_seq += 1;
        let choice = Choice {
            pane,
            seq: self.next_seq,
        };
        self.panes.insert(key.clone(), choice);
        if self.selected.is_none() || self.selected.as_ref() == Some(key) {
            self.shown = choice;
        }
    }

    pub fn selected(&self) -> Option<&ProjectKey> {
        self.selected.as_ref()
    }

    pub fn pane_for(&self, key: &ProjectKey) -> Pane {
        let stored = self.panes.get(key).copied().unwrap_or_default();
        if self.selected.as_ref() == Some(key) && self.shown.seq > stored.seq {
            self.shown.pane
        } else {
            stored.pane
        }
    }

    pub fn current(&self) -> CurrentView {
        CurrentView {
            selected: self.selected.clone(),
            pane: self.selected.as_ref().map(|k| self.pane_for(k)),
        }
    }

    /// Drop everything known about a deleted project
    pub fn forget(&mut self, key: &ProjectKey) {
        self.panes.remove(key);
        if self.selected.as_ref() == Some(key) {
            self.selected = None;
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> (ProjectKey, ProjectKey) {
        (ProjectKey::from("a"), ProjectKey::from("b"))
    }

    #[test]
    fn test_pane_survives_switching_back() {
        let (a, b) = keys();
        let mut view = ViewState::new();
        view.select_project(&a);
        view.select_pane(&a, Pane::Log);
        view.select_project(&b);
        view.select_project(&a);
        assert_eq!(view.pane_for(&a), Pane::Log);
    }

    #[test]
    fn test_log_carries_over_to_other_project() {
        let (a, b) = keys();
        let mut view = ViewState::new();
        view.select_pane(&b, Pane::Configuration);
        view.select_project(&a);
        view.select_pane(&a, Pane::Log);
        view.select_project(&b);
        assert_eq!(view.current().pane, Some(Pane::Log));
    }

    #[test]
    fn test_configuration_carries_over_too() {
        let (a, b) = keys();
        let mut view = ViewState::new();
        view.select_pane(&b, Pane::Log);
        view.select_project(&a);
        view.select_pane(&a, Pane::Configuration);
        view.select_project(&b);
        assert_eq!(view.pane_for(&b), Pane::Configuration);
    }

    #[test]
    fn test_select_pane_for_unselected_project() {
        let (a, b) = keys();
        let mut view = ViewState::new();
        view.select_project(&a);
        view.select_pane(&a, Pane::Log);
        view.select_pane(&b, Pane::Configuration);
        assert_eq!(view.pane_for(&a), Pane::Log);
        assert_eq!(view.pane_for(&b), Pane::Configuration);
    }

    #[test]
    fn test_select_project_keeps_stored_pane() {
        let (a, b) = keys();
        let mut view = ViewState::new();
        view.select_pane(&b, Pane::Log);
        view.select_project(&a);
        view.select_pane(&a, Pane::Configuration);
        view.select_project(&b);
        view.select_project(&a);
        // b was shown with a's pane while selected, but its own choice stands.
        assert_eq!(view.pane_for(&b), Pane::Log);
    }

    #[test]
    fn test_pane_chosen_while_other_selected_survives() {
        let (a, b) = keys();
        let c = ProjectKey::from("c");
        let mut view = ViewState::new();
        view.select_project(&c);
        view.select_pane(&a, Pane::Log);
        view.select_project(&b);
        assert_eq!(view.pane_for(&b), Pane::Configuration);
        view.select_project(&a);
        assert_eq!(view.pane_for(&a), Pane::Log);
    }

    #[test]
    fn test_newer_carried_pane_beats_older_choice() {
        let (a, b) = keys();
        let c = ProjectKey::from("c");
        let mut view = ViewState::new();
        view.select_project(&c);
        view.select_pane(&a, Pane::Log);
        view.select_pane(&c, Pane::Configuration);
        view.select_project(&a);
        // c's configuration pane was picked after a's log pane.
        assert_eq!(view.pane_for(&a), Pane::Configuration);
        view.select_pane(&a, Pane::Log);
        view.select_project(&b);
        assert_eq!(view.pane_for(&b), Pane::Log);
    }

    #[test]
    fn test_forget_and_reset() {
        let (a, b) = keys();
        let mut view = ViewState::new();
        view.select_project(&a);
        view.select_pane(&b, Pane::Log);
        view.forget(&a);
        assert_eq!(view.current().selected, None);

        view.select_project(&b);
        view.reset();
        assert_eq!(
            view.current(),
            CurrentView {
                selected: None,
                pane: None
            }
        );
        assert_eq!(view.pane_for(&b), Pane::Configuration);
    }
}
