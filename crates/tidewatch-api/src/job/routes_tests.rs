//! Tests for job routes.

use super::*;
use crate::job::definition::{JobDefinition, JobTarget};
use crate::job::trigger::{IntervalUnit, Trigger};
use chrono::Utc;

#[test]
fn test_job_list_response_serialization() {
    let response = JobListResponse {
        count: 0,
        jobs: vec![],
    };
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["count"], 0);
    assert!(json["jobs"].as_array().unwrap().is_empty());
}

#[test]
fn test_job_response_serialization() {
    let def = JobDefinition::new(
        "nightly-images",
        JobTarget::AllImages,
        Trigger::cron("0 3 * * *"),
    );
    let job = Job::new("default", def, Utc::now());
    let response = JobResponse { job };
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["job"]["store"], "default");
    assert_eq!(json["job"]["definition"]["id"], "nightly-images");
    assert_eq!(json["job"]["definition"]["target"]["kind"], "all-images");
    assert_eq!(json["job"]["definition"]["trigger"]["expr"], "0 3 * * *");
    assert_eq!(json["job"]["run_count"], 0);
}

#[test]
fn test_single_target_serialization() {
    let def = JobDefinition::new(
        "worker",
        JobTarget::SingleContainer {
            reference: "worker".into(),
        },
        Trigger::interval(IntervalUnit::Hours, 1),
    );
    let json = serde_json::to_value(&def).unwrap();
    assert_eq!(json["target"], serde_json::json!({"kind": "single-container", "reference": "worker"}));
    assert!(json.get("description").is_none());
}
