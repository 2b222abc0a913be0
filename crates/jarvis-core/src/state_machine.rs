use serde::Serialize;

use crate::ports::PortError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionState {
    Parsing,
    Resolved,
    Prepared,
    Composed,
    Confirming,
    Signing,
    Broadcasting,
    Monitoring,
    Analyzing,
    Done,
    Aborted,
    Failed,
}

impl ActionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActionState::Done | ActionState::Aborted | ActionState::Failed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionEvent {
    TargetsResolved,
    MetadataLoaded,
    ParamsEncoded,
    TxBuilt,
    Confirmed,
    Declined,
    DryRun,
    Signed,
    Accepted,
    NoWait,
    Mined,
    Lost,
    /// Skip straight to analysis of an existing transaction.
    Inspect,
    Analyzed,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateTransition {
    pub from: ActionState,
    pub to: ActionState,
    pub reason: &'static str,
}

pub fn action_transition(
    state: ActionState,
    event: ActionEvent,
) -> Result<(ActionState, StateTransition), PortError> {
    use ActionEvent as E;
    use ActionState as S;

    let (to, reason) = match (state, event) {
        (s, E::Fail) if !s.is_terminal() => (S::Failed, "failed"),
        (S::Parsing, E::TargetsResolved) => (S::Resolved, "targets resolved"),
        (S::Resolved, E::MetadataLoaded) => (S::Prepared, "abi and token metadata loaded"),
        (S::Resolved, E::Inspect) => (S::Analyzing, "inspecting existing transaction"),
        (S::Prepared, E::ParamsEncoded) => (S::Composed, "parameters encoded"),
        (S::Composed, E::TxBuilt) => (S::Confirming, "transaction built"),
        (S::Confirming, E::Confirmed) => (S::Signing, "operator confirmed"),
        (S::Confirming, E::Declined) => (S::Aborted, "operator declined"),
        (S::Confirming, E::DryRun) => (S::Done, "dry run"),
        (S::Signing, E::Signed) => (S::Broadcasting, "signed"),
        (S::Broadcasting, E::Accepted) => (S::Monitoring, "accepted by a node"),
        (S::Monitoring, E::NoWait) => (S::Done, "not waiting for inclusion"),
        (S::Monitoring, E::Mined) => (S::Analyzing, "mined"),
        (S::Monitoring, E::Lost) => (S::Failed, "lost"),
        (S::Analyzing, E::Analyzed) => (S::Done, "analyzed"),
        _ => {
            return Err(PortError::Validation(format!(
                "illegal action transition: {state:?} on {event:?}"
            )))
        }
    };
    Ok((
        to,
        StateTransition {
            from: state,
            to,
            reason,
        },
    ))
}
