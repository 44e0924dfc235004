use loan_desk::workflows::underwriting::{
    AgentId, InMemoryLendingStore, LendingError, LendingRepository, LendingSettings, LoanService,
    NewAgent, NotificationError, Notifier,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

pub(crate) type Desk = LoanService<InMemoryLendingStore, TracingNotifier>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Notifier that writes each message to the log instead of a gateway.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn send_sms(&self, phone: &str, message: &str) -> Result<(), NotificationError> {
        info!(target: "notifications", channel = "sms", %phone, %message, "notification sent");
        Ok(())
    }

    fn send_push(&self, agent_id: AgentId, message: &str) -> Result<(), NotificationError> {
        info!(target: "notifications", channel = "push", %agent_id, %message, "notification sent");
        Ok(())
    }
}

pub(crate) fn build_desk(settings: LendingSettings) -> Arc<Desk> {
    Arc::new(LoanService::new(
        Arc::new(InMemoryLendingStore::new()),
        Arc::new(TracingNotifier),
        settings,
    ))
}

/// Reference roster: one manager and two agents reporting to them.
pub(crate) fn seed_agents<R, N>(desk: &LoanService<R, N>) -> Result<(), LendingError>
where
    R: LendingRepository + 'static,
    N: Notifier + 'static,
{
    let roster = [
        (1, "John Manager", None),
        (2, "Alice Agent", Some(AgentId(1))),
        (3, "Bob Agent", Some(AgentId(1))),
    ];

    for (id, name, manager) in roster {
        desk.create_agent(NewAgent {
            id: Some(AgentId(id)),
            name: name.to_string(),
            manager,
        })?;
    }
    Ok(())
}
