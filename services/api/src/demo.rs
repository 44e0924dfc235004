use crate::infra::seed_agents;
use clap::Args;
use loan_desk::error::AppError;
use loan_desk::workflows::underwriting::{
    AgentId, InMemoryLendingStore, LendingSettings, LoanCategory, LoanService, LoanStatus,
    LoanSubmission, NotificationError, Notifier, ProcessorConfig, RetryPolicy,
};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const SAMPLE_AMOUNTS: [i64; 8] = [
    2_500, 8_000, 45_000, 120_000, 750_000, 10_000, 300_000, 1_200_000,
];
const SAMPLE_CUSTOMERS: [(&str, &str); 4] = [
    ("Avery Chen", "555-0101"),
    ("Jordan Patel", "555-0102"),
    ("Riley Okafor", "555-0103"),
    ("Sam Lindqvist", "555-0104"),
];

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Number of sample loans to submit.
    #[arg(long, default_value_t = 12)]
    pub(crate) loans: usize,
    /// Worker pool size.
    #[arg(long, default_value_t = 3)]
    pub(crate) workers: usize,
    /// Upper bound of the simulated review delay, in milliseconds.
    #[arg(long, default_value_t = 50)]
    pub(crate) max_review_ms: u64,
}

#[derive(Default)]
struct CountingNotifier {
    sms: AtomicUsize,
    pushes: AtomicUsize,
}

impl Notifier for CountingNotifier {
    fn send_sms(&self, _phone: &str, _message: &str) -> Result<(), NotificationError> {
        self.sms.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn send_push(&self, _agent_id: AgentId, _message: &str) -> Result<(), NotificationError> {
        self.pushes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

fn demo_settings(args: &DemoArgs) -> LendingSettings {
    LendingSettings {
        processor: ProcessorConfig {
            workers: args.workers.max(1),
            queue_capacity: 16,
            feed_interval: Duration::from_millis(25),
            review_delay_min: Duration::ZERO,
            review_delay_max: Duration::from_millis(args.max_review_ms),
            retry: RetryPolicy {
                max_attempts: 2,
                base_backoff: Duration::from_millis(10),
                max_backoff: Duration::from_millis(20),
            },
        },
        ..LendingSettings::default()
    }
}

fn sample_submission(index: usize) -> LoanSubmission {
    let (name, phone) = SAMPLE_CUSTOMERS[index % SAMPLE_CUSTOMERS.len()];
    let category = match index % 4 {
        0 => LoanCategory::Personal,
        1 => LoanCategory::Home,
        2 => LoanCategory::Auto,
        _ => LoanCategory::Business,
    };
    LoanSubmission {
        customer_name: name.to_string(),
        customer_phone: phone.to_string(),
        amount: Decimal::from(SAMPLE_AMOUNTS[index % SAMPLE_AMOUNTS.len()]),
        category,
    }
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let notifier = Arc::new(CountingNotifier::default());
    let desk = Arc::new(LoanService::new(
        Arc::new(InMemoryLendingStore::new()),
        notifier.clone(),
        demo_settings(&args),
    ));
    seed_agents(desk.as_ref())?;

    println!("Loan desk demo");
    println!(
        "Submitting {} loans to {} workers (review delay up to {} ms)",
        args.loans, args.workers, args.max_review_ms
    );
    for index in 0..args.loans {
        desk.submit_loan(sample_submission(index))?;
    }

    let (shutdown, signal) = watch::channel(false);
    let processor = tokio::spawn(desk.processor().run(signal));

    wait_for_pipeline(&desk, Duration::from_secs(30)).await?;

    let reviews = desk.list_loans(Some(LoanStatus::UnderReview), 1, Some(100))?;
    println!("\nAgent reviews");
    for (position, loan) in reviews.loans.iter().enumerate() {
        let Some(agent) = loan.assigned_agent else {
            continue;
        };
        let decision = if position % 2 == 0 { "APPROVE" } else { "REJECT" };
        let decided = desk.apply_decision(agent, loan.id, decision)?;
        println!(
            "  loan #{} ({}) agent {} -> {}",
            decided.id, decided.amount, agent, decided.status
        );
    }

    let _ = shutdown.send(true);
    let report = match processor.await {
        Ok(report) => report,
        Err(err) => {
            println!("\nProcessor task failed: {err}");
            return Ok(());
        }
    };

    println!("\nPipeline");
    println!(
        "  enqueued {} | processed {} | failed {}",
        report.enqueued, report.processed, report.failed
    );

    println!("\nStatus counts");
    for (status, count) in desk.status_counts()? {
        println!("  {:<20} {}", status.label(), count);
    }

    println!("\nTop customers");
    let top = desk.top_customers()?;
    if top.is_empty() {
        println!("  none yet");
    }
    for entry in top {
        println!("  {:<16} {} approved", entry.customer_name, entry.approved_loans);
    }

    let dead_letters = desk.dead_letters()?;
    if !dead_letters.is_empty() {
        println!("\nDead letters");
        for entry in dead_letters {
            println!(
                "  loan #{} after {} attempts: {}",
                entry.loan_id, entry.attempts, entry.reason
            );
        }
    }

    println!(
        "\nNotifications: {} sms, {} push",
        notifier.sms.load(Ordering::Relaxed),
        notifier.pushes.load(Ordering::Relaxed)
    );
    Ok(())
}

async fn wait_for_pipeline(
    desk: &LoanService<InMemoryLendingStore, CountingNotifier>,
    limit: Duration,
) -> Result<(), AppError> {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        let counts = desk.status_counts()?;
        let pending = counts.get(&LoanStatus::Applied).copied().unwrap_or_default()
            + counts.get(&LoanStatus::Processing).copied().unwrap_or_default();
        let stuck = desk.dead_letters()?.len();
        if pending <= stuck || tokio::time::Instant::now() >= deadline {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
