use crate::ports::PortError;

/// Result of reconciling the local pending record with the node view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonceDecision {
    pub nonce: u64,
    /// Value the local pending record holds afterwards.
    pub local: u64,
}

/// Picks the next nonce from the mined count, the node's pending count and
/// the local pending record (`None` before the first use in this run).
pub fn reconcile(mined: u64, remote: u64, local: Option<u64>) -> Result<NonceDecision, PortError> {
    if mined > remote {
        return Err(PortError::Validation(format!(
            "abnormal node data: mined nonce {mined} > pending nonce {remote}"
        )));
    }
    let local = local.unwrap_or(remote);
    let decision = if mined == remote {
        if local <= mined {
            NonceDecision {
                nonce: mined,
                local: mined,
            }
        } else {
            NonceDecision {
                nonce: local,
                local,
            }
        }
    } else if local <= remote {
        // other apps have pending transactions
        NonceDecision {
            nonce: remote,
            local,
        }
    } else {
        NonceDecision {
            nonce: local,
            local,
        }
    };
    Ok(decision)
}
