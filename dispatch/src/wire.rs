//! Work-item wire format (§6.2): historical v0 (accepted but ignored by
//! modern workers) and current v3.

use crate::calculator::DiffCalculator;
use sched_lib::model::GroupingId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItemV0 {
    pub grouping: serde_json::Value,
    #[serde(default)]
    pub additional_digests: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItemV3 {
    pub version: u8,
    pub grouping: serde_json::Value,
    #[serde(default)]
    pub additional_left: Vec<String>,
    #[serde(default)]
    pub additional_right: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum WorkItem {
    V0(WorkItemV0),
    V3(WorkItemV3),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkOutcome {
    Ack,
    Nack,
}

/// Parses a raw payload into a `WorkItem`. Invalid JSON is dropped (Ack) —
/// another subscriber would fail identically on the same malformed
/// message (§6.2).
pub fn parse(payload: &[u8]) -> Result<WorkItem, WorkOutcome> {
    let value: serde_json::Value = serde_json::from_slice(payload).map_err(|_| WorkOutcome::Ack)?;

    if value.get("version").and_then(|v| v.as_u64()) == Some(3) {
        let item: WorkItemV3 = serde_json::from_value(value).map_err(|_| WorkOutcome::Ack)?;
        Ok(WorkItem::V3(item))
    } else {
        let item: WorkItemV0 = serde_json::from_value(value).map_err(|_| WorkOutcome::Ack)?;
        Ok(WorkItem::V0(item))
    }
}

impl WorkItem {
    fn grouping_id(&self) -> Result<GroupingId, WorkOutcome> {
        let grouping = match self {
            WorkItem::V0(item) => &item.grouping,
            WorkItem::V3(item) => &item.grouping,
        };
        serde_json::from_value(grouping.clone()).map_err(|_| WorkOutcome::Ack)
    }

    fn additional_digests(&self) -> Vec<String> {
        match self {
            WorkItem::V0(item) => item.additional_digests.clone(),
            WorkItem::V3(item) => item
                .additional_left
                .iter()
                .chain(item.additional_right.iter())
                .cloned()
                .collect(),
        }
    }
}

/// Parses a raw payload and runs it through `calculator`, producing the
/// Ack/Nack a queue subscriber acknowledges the message with (§6.2): a
/// malformed payload is Acked (it will never parse, retrying is pointless),
/// a calculator failure is Nacked (the message is redelivered and retried).
pub async fn handle(calculator: &Arc<dyn DiffCalculator>, payload: &[u8]) -> WorkOutcome {
    let item = match parse(payload) {
        Ok(item) => item,
        Err(outcome) => return outcome,
    };
    let grouping_id = match item.grouping_id() {
        Ok(id) => id,
        Err(outcome) => return outcome,
    };

    let params = match calculator.expand_grouping(&grouping_id).await {
        Ok(params) => params,
        Err(_) => return WorkOutcome::Nack,
    };

    match calculator.calculate_diffs(&params, &item.additional_digests()).await {
        Ok(()) => WorkOutcome::Ack,
        Err(_) => WorkOutcome::Nack,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v0_has_no_version_field() {
        let payload = br#"{"grouping": {"name": "g1"}, "additional_digests": ["ab"]}"#;
        match parse(payload).unwrap() {
            WorkItem::V0(item) => assert_eq!(item.additional_digests, vec!["ab".to_string()]),
            WorkItem::V3(_) => panic!("expected v0"),
        }
    }

    #[test]
    fn v3_is_recognized_by_version_field() {
        let payload = br#"{"version": 3, "grouping": {"name": "g1"}, "additional_left": ["a"], "additional_right": ["b"]}"#;
        match parse(payload).unwrap() {
            WorkItem::V3(item) => {
                assert_eq!(item.additional_left, vec!["a".to_string()]);
                assert_eq!(item.additional_right, vec!["b".to_string()]);
            }
            WorkItem::V0(_) => panic!("expected v3"),
        }
    }

    #[test]
    fn invalid_json_is_acked_not_nacked() {
        let payload = b"not json";
        assert_eq!(parse(payload).unwrap_err(), WorkOutcome::Ack);
    }

    use crate::calculator::{CalcError, Params};
    use async_trait::async_trait;

    struct StubCalculator {
        fails: bool,
    }

    #[async_trait]
    impl DiffCalculator for StubCalculator {
        async fn calculate_diffs(&self, _grouping: &Params, _additional_digests: &[String]) -> Result<(), CalcError> {
            if self.fails {
                Err(CalcError::Failed("stub failure".into()))
            } else {
                Ok(())
            }
        }

        async fn expand_grouping(&self, grouping_id: &GroupingId) -> Result<Params, CalcError> {
            let mut params = Params::new();
            params.insert("grouping_id".into(), grouping_id.0.clone());
            Ok(params)
        }
    }

    #[tokio::test]
    async fn successful_calculation_acks() {
        let calculator: Arc<dyn DiffCalculator> = Arc::new(StubCalculator { fails: false });
        let payload = br#"{"grouping": "g1", "additional_digests": []}"#;
        assert_eq!(handle(&calculator, payload).await, WorkOutcome::Ack);
    }

    #[tokio::test]
    async fn calculator_failure_nacks() {
        let calculator: Arc<dyn DiffCalculator> = Arc::new(StubCalculator { fails: true });
        let payload = br#"{"version": 3, "grouping": "g1", "additional_left": [], "additional_right": []}"#;
        assert_eq!(handle(&calculator, payload).await, WorkOutcome::Nack);
    }

    #[tokio::test]
    async fn malformed_payload_acks_without_reaching_the_calculator() {
        let calculator: Arc<dyn DiffCalculator> = Arc::new(StubCalculator { fails: true });
        assert_eq!(handle(&calculator, b"not json").await, WorkOutcome::Ack);
    }
}
