use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::AppError;
use crate::models::shipment::ShipmentStatus;

/// Decides whether a shipment may move from one status to another.
pub trait TransitionPolicy: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn check(&self, from: ShipmentStatus, to: ShipmentStatus) -> Result<(), AppError>;
}

/// Any status may follow any other, including regressions out of `delivered`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Permissive;

impl TransitionPolicy for Permissive {
    fn name(&self) -> &'static str {
        "permissive"
    }

    fn check(&self, _from: ShipmentStatus, _to: ShipmentStatus) -> Result<(), AppError> {
        Ok(())
    }
}

/// Only moves along created → picked_up → in_transit → out_for_delivery →
/// delivered (steps may be skipped). `delayed` is reachable from every
/// non-terminal status and may be left for any status. `delivered` is final.
#[derive(Debug, Default, Clone, Copy)]
pub struct ForwardOnly;

fn rank(status: ShipmentStatus) -> Option<u8> {
    match status {
        ShipmentStatus::Created => Some(0),
        ShipmentStatus::PickedUp => Some(1),
        ShipmentStatus::InTransit => Some(2),
        ShipmentStatus::OutForDelivery => Some(3),
        ShipmentStatus::Delivered => Some(4),
        ShipmentStatus::Delayed => None,
    }
}

impl TransitionPolicy for ForwardOnly {
    fn name(&self) -> &'static str {
        "forward"
    }

    fn check(&self, from: ShipmentStatus, to: ShipmentStatus) -> Result<(), AppError> {
        if from == to {
            return Ok(());
        }

        let allowed = if from.is_terminal() {
            false
        } else {
            match (rank(from), rank(to)) {
                (_, None) | (None, _) => true,
                (Some(a), Some(b)) => b > a,
            }
        };

        if allowed {
            Ok(())
        } else {
            Err(AppError::Conflict(format!(
                "status cannot change from {from} to {to}"
            )))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolicyKind {
    #[default]
    Permissive,
    Forward,
}

impl PolicyKind {
    pub fn build(self) -> Arc<dyn TransitionPolicy> {
        match self {
            PolicyKind::Permissive => Arc::new(Permissive),
            PolicyKind::Forward => Arc::new(ForwardOnly),
        }
    }
}

impl FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "permissive" => Ok(PolicyKind::Permissive),
            "forward" => Ok(PolicyKind::Forward),
            other => Err(format!("unknown transition policy {other}, expected permissive/forward")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::shipment::ShipmentStatus::*;

    #[test]
    fn permissive_allows_every_pair() {
        for from in ShipmentStatus::ALL {
            for to in ShipmentStatus::ALL {
                assert!(Permissive.check(from, to).is_ok());
            }
        }
    }

    #[test]
    fn forward_only_rejects_regressions() {
        assert!(ForwardOnly.check(Created, PickedUp).is_ok());
        assert!(ForwardOnly.check(Created, OutForDelivery).is_ok());
        assert!(ForwardOnly.check(InTransit, PickedUp).is_err());
        assert!(ForwardOnly.check(Delivered, InTransit).is_err());
    }

    #[test]
    fn forward_only_treats_delayed_as_a_detour() {
        assert!(ForwardOnly.check(InTransit, Delayed).is_ok());
        assert!(ForwardOnly.check(Delayed, PickedUp).is_ok());
        assert!(ForwardOnly.check(Delayed, Delivered).is_ok());
        assert!(ForwardOnly.check(Delivered, Delayed).is_err());
    }

    #[test]
    fn policy_names_parse() {
        assert_eq!("Forward".parse::<PolicyKind>().unwrap(), PolicyKind::Forward);
        assert_eq!(" permissive ".parse::<PolicyKind>().unwrap(), PolicyKind::Permissive);
        assert!("strict".parse::<PolicyKind>().is_err());
    }
}
