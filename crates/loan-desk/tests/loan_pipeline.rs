//! Integration scenarios for the loan pipeline.
//!
//! Everything goes through the public service facade and HTTP router: loans are submitted,
//! the background processor decides or assigns them, and agents close out their reviews.

mod common {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use loan_desk::workflows::underwriting::{
        AgentId, InMemoryLendingStore, LendingSettings, LoanService, NewAgent, NotificationError,
        Notifier, ProcessorConfig, RetryPolicy, SimulatedReview,
    };

    #[derive(Default)]
    pub struct Outbox {
        pub sms: Mutex<Vec<String>>,
        pub pushes: Mutex<Vec<(AgentId, String)>>,
    }

    impl Notifier for Outbox {
        fn send_sms(&self, _phone: &str, message: &str) -> Result<(), NotificationError> {
            self.sms.lock().expect("sms lock").push(message.to_string());
            Ok(())
        }

        fn send_push(&self, agent_id: AgentId, message: &str) -> Result<(), NotificationError> {
            self.pushes
                .lock()
                .expect("push lock")
                .push((agent_id, message.to_string()));
            Ok(())
        }
    }

    pub type Desk = LoanService<InMemoryLendingStore, Outbox>;

    pub fn desk() -> (Arc<Desk>, Arc<InMemoryLendingStore>, Arc<Outbox>) {
        let store = Arc::new(InMemoryLendingStore::new());
        let outbox = Arc::new(Outbox::default());
        let settings = LendingSettings {
            processor: ProcessorConfig {
                workers: 2,
                queue_capacity: 4,
                feed_interval: Duration::from_millis(10),
                review_delay_min: Duration::ZERO,
                review_delay_max: Duration::from_millis(3),
                retry: RetryPolicy {
                    max_attempts: 2,
                    base_backoff: Duration::from_millis(1),
                    max_backoff: Duration::from_millis(2),
                },
            },
            ..LendingSettings::default()
        };
        let service = LoanService::new(store.clone(), outbox.clone(), settings)
            .with_review(Arc::new(SimulatedReview::new(
                Duration::ZERO,
                Duration::from_millis(3),
            )));

        service
            .create_agent(NewAgent {
                id: Some(AgentId(1)),
                name: "John Manager".to_string(),
                manager: None,
            })
            .expect("manager seeded");
        for (id, name) in [(2, "Alice Agent"), (3, "Bob Agent")] {
            service
                .create_agent(NewAgent {
                    id: Some(AgentId(id)),
                    name: name.to_string(),
                    manager: Some(AgentId(1)),
                })
                .expect("agent seeded");
        }

        (Arc::new(service), store, outbox)
    }
}

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use loan_desk::workflows::underwriting::{
    underwriting_router, LendingRepository, LoanCategory, LoanStatus, LoanSubmission,
};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tokio::sync::watch;
use tower::ServiceExt;

async fn settle(service: &common::Desk, submitted: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let counts = service.status_counts().expect("counts");
        let pending = counts[&LoanStatus::Applied] + counts[&LoanStatus::Processing];
        let total: usize = counts.values().sum();
        if (pending == 0 && total == submitted) || tokio::time::Instant::now() >= deadline {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn loans_flow_from_intake_to_agent_decision() {
    let (service, store, outbox) = common::desk();
    let (shutdown, signal) = watch::channel(false);
    let processor = tokio::spawn(service.processor().run(signal));

    let amounts = [dec!(5000), dec!(600000), dec!(50000), dec!(75000)];
    for (index, amount) in amounts.into_iter().enumerate() {
        service
            .submit_loan(LoanSubmission {
                customer_name: format!("Borrower {index}"),
                customer_phone: format!("555-30{index:02}"),
                amount,
                category: LoanCategory::Business,
            })
            .expect("submitted");
    }

    settle(&service, amounts.len()).await;

    let counts = service.status_counts().expect("counts");
    assert_eq!(counts[&LoanStatus::ApprovedBySystem], 1);
    assert_eq!(counts[&LoanStatus::RejectedBySystem], 1);
    assert_eq!(counts[&LoanStatus::UnderReview], 2);

    let under_review = service
        .list_loans(Some(LoanStatus::UnderReview), 1, None)
        .expect("listing");
    assert!(under_review
        .loans
        .iter()
        .all(|loan| matches!(loan.assigned_agent.map(|agent| agent.0), Some(2 | 3))));
    assert_eq!(outbox.pushes.lock().expect("push lock").len(), 4);

    let target = &under_review.loans[0];
    let agent = target.assigned_agent.expect("assigned");
    let router = underwriting_router(service.clone());
    let response = router
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(format!(
                    "/api/v1/agents/{}/loans/{}/decision",
                    agent, target.id
                ))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::to_vec(&json!({ "decision": "APPROVE" })).expect("json"),
                ))
                .expect("request builds"),
        )
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("body");
    let payload: Value = serde_json::from_slice(&body).expect("json payload");
    assert_eq!(
        payload["loan"]["application_status"],
        json!("APPROVED_BY_AGENT")
    );

    shutdown.send(true).expect("processor listening");
    let report = processor.await.expect("processor drains");
    assert_eq!(report.enqueued, 4);
    assert_eq!(report.processed, 4);

    let sms = outbox.sms.lock().expect("sms lock").clone();
    assert!(sms.contains(&"Your loan has been approved by system.".to_string()));
    assert!(sms.contains(&"loan application has been rejected by system.".to_string()));
    assert!(sms.contains(&"Your loan has been approved by our agent.".to_string()));

    let top = service.top_customers().expect("top customers");
    assert_eq!(top.len(), 2);
    assert!(top.iter().all(|entry| entry.approved_loans == 1));
    assert!(store.dead_letters().expect("readable").is_empty());
}

#[tokio::test]
async fn processor_started_late_picks_up_the_backlog() {
    let (service, _, _) = common::desk();
    for index in 0..6 {
        service
            .submit_loan(LoanSubmission {
                customer_name: "Repeat Borrower".to_string(),
                customer_phone: "555-3999".to_string(),
                amount: dec!(1000) + rust_decimal::Decimal::from(index),
                category: LoanCategory::Personal,
            })
            .expect("submitted");
    }

    let (shutdown, signal) = watch::channel(false);
    let processor = tokio::spawn(service.processor().run(signal));
    settle(&service, 6).await;
    shutdown.send(true).expect("processor listening");
    let report = processor.await.expect("processor drains");

    assert_eq!(report.processed, 6);
    let top = service.top_customers().expect("top customers");
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].customer_name, "Repeat Borrower");
    assert_eq!(top[0].approved_loans, 6);
}
