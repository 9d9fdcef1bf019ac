//! Two-step (stage, then confirm) form state shared by the measurement and
//! site editors, plus the small bits of per-field and per-row UI state.

use super::{errors::DashboardError, model::Parameter, model::Readings};

/// How a form's lifecycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Inserted,
    Updated,
    /// Confirmed, but there was nothing to write to.
    Skipped,
    Cancelled,
}

/// `Idle -> Drafting -> PendingConfirm -> Done`.
///
/// `D` is what the user is editing; `P` is the staged payload, which carries
/// its own target id. Transitions consume the state and return the next one,
/// so a failed transition leaves the caller's copy untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum FormState<D, P> {
    Idle,
    Drafting(D),
    PendingConfirm(P),
    Done(Outcome),
}

impl<D, P> Default for FormState<D, P> {
    fn default() -> Self {
        FormState::Idle
    }
}

impl<D, P> FormState<D, P> {
    pub fn open(draft: D) -> Self {
        FormState::Drafting(draft)
    }

    pub fn draft(&self) -> Option<&D> {
        match self {
            FormState::Drafting(draft) => Some(draft),
            _ => None,
        }
    }

    pub fn pending(&self) -> Option<&P> {
        match self {
            FormState::PendingConfirm(payload) => Some(payload),
            _ => None,
        }
    }

    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            FormState::Done(outcome) => Some(*outcome),
            _ => None,
        }
    }

    /// `Drafting -> PendingConfirm`.
    pub fn stage(self, payload: P) -> Result<Self, DashboardError> {
        match self {
            FormState::Drafting(_) => Ok(FormState::PendingConfirm(payload)),
            _ => Err(DashboardError::InvalidState("nothing is being edited")),
        }
    }

    /// `PendingConfirm -> Done(outcome)`, after the payload has been written.
    pub fn finish(self, outcome: Outcome) -> Result<Self, DashboardError> {
        match self {
            FormState::PendingConfirm(_) => Ok(FormState::Done(outcome)),
            _ => Err(DashboardError::InvalidState("no changes are awaiting confirmation")),
        }
    }

    /// Drops whatever was drafted or staged. Never touches storage.
    pub fn cancel(self) -> Self {
        match self {
            FormState::Drafting(_) | FormState::PendingConfirm(_) => {
                FormState::Done(Outcome::Cancelled)
            }
            other => other,
        }
    }
}

/// A numeric widget with its "not available" checkbox.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericField {
    pub value: f64,
    pub not_available: bool,
}

impl NumericField {
    /// The widget as it should first appear. With a record to edit, a null
    /// value starts with N/A ticked; a blank form starts with every N/A off.
    pub fn prefill(parameter: Parameter, existing: Option<&Readings>) -> Self {
        match existing.map(|r| r.get(parameter)) {
            Some(Some(value)) => NumericField {
                value,
                not_available: false,
            },
            Some(None) => NumericField {
                value: parameter.widget_default(),
                not_available: true,
            },
            None => NumericField {
                value: parameter.widget_default(),
                not_available: false,
            },
        }
    }

    /// N/A wins over whatever number the widget shows.
    pub fn resolve(self) -> Option<f64> {
        match self.not_available {
            true => None,
            false => Some(self.value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteAction {
    /// First click: nothing deleted yet.
    Armed,
    /// Second consecutive click on the same row.
    Confirmed,
}

/// Which row, if any, has had its delete button pressed once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteGuard {
    armed: Option<i64>,
}

impl DeleteGuard {
    pub fn armed(&self) -> Option<i64> {
        self.armed
    }

    pub fn press(self, id: i64) -> (DeleteGuard, DeleteAction) {
        match self.armed == Some(id) {
            true => (DeleteGuard { armed: None }, DeleteAction::Confirmed),
            false => (DeleteGuard { armed: Some(id) }, DeleteAction::Armed),
        }
    }
}

/// A message for the next page the user sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Success(String),
    Info(String),
    Warning(String),
    Error(String),
}

impl Notice {
    pub fn level(&self) -> &'static str {
        match self {
            Notice::Success(_) => "success",
            Notice::Info(_) => "info",
            Notice::Warning(_) => "warning",
            Notice::Error(_) => "error",
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Notice::Success(t) | Notice::Info(t) | Notice::Warning(t) | Notice::Error(t) => t,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Form = FormState<&'static str, u32>;

    #[test]
    fn test_happy_path_reaches_done() {
        let form = Form::open("draft");
        let form = form.stage(7).unwrap();
        assert_eq!(form.pending(), Some(&7));
        let form = form.finish(Outcome::Inserted).unwrap();
        assert_eq!(form.outcome(), Some(Outcome::Inserted));
    }

    #[test]
    fn test_stage_requires_a_draft() {
        assert!(Form::Idle.stage(1).is_err());
        assert!(Form::PendingConfirm(1).stage(2).is_err());
    }

    #[test]
    fn test_finish_requires_pending_payload() {
        assert!(Form::open("draft").finish(Outcome::Updated).is_err());
        assert!(Form::Idle.finish(Outcome::Updated).is_err());
    }

    #[test]
    fn test_cancel_discards_pending_payload() {
        let form = Form::open("draft").stage(3).unwrap().cancel();
        assert_eq!(form, Form::Done(Outcome::Cancelled));
        assert_eq!(form.pending(), None);
        // cancelling twice changes nothing further
        assert_eq!(form.clone().cancel(), form);
    }

    #[test]
    fn test_na_toggle_forces_null_whatever_the_widget_says() {
        let field = NumericField {
            value: 12.5,
            not_available: true,
        };
        assert_eq!(field.resolve(), None);
        let field = NumericField {
            value: 12.5,
            not_available: false,
        };
        assert_eq!(field.resolve(), Some(12.5));
    }

    #[test]
    fn test_prefill_ticks_na_only_for_null_existing_values() {
        let mut readings = Readings::default();
        readings.set(Parameter::Flow, Some(0.0));

        let flow = NumericField::prefill(Parameter::Flow, Some(&readings));
        assert_eq!(flow, NumericField { value: 0.0, not_available: false });

        let ph = NumericField::prefill(Parameter::Ph, Some(&readings));
        assert!(ph.not_available);
        assert_eq!(ph.value, 7.0);

        let fresh = NumericField::prefill(Parameter::Hardness, None);
        assert!(!fresh.not_available);
    }

    #[test]
    fn test_delete_needs_two_presses_on_the_same_row() {
        let guard = DeleteGuard::default();
        let (guard, action) = guard.press(4);
        assert_eq!(action, DeleteAction::Armed);
        assert_eq!(guard.armed(), Some(4));

        // a press on another row re-arms instead of deleting
        let (guard, action) = guard.press(5);
        assert_eq!(action, DeleteAction::Armed);
        assert_eq!(guard.armed(), Some(5));

        let (guard, action) = guard.press(5);
        assert_eq!(action, DeleteAction::Confirmed);
        assert_eq!(guard.armed(), None);
    }
}
