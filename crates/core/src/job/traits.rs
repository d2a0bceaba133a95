use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info};

use super::{JobContext, JobError};
use crate::auth::PasswordAuthenticator;

/// One kind of automation.
#[async_trait]
pub trait Job: Send + Sync {
    /// Registry name, used for logs and metrics.
    fn name(&self) -> &str;

    /// Whether setup launches a browser session for the job.
    fn requires_driver(&self) -> bool {
        true
    }

    /// Log in before any record is processed. `false` aborts the job.
    ///
    /// The default drives the password form configured for the job's
    /// system with the referenced credentials. Jobs without a credentials
    /// reference have nothing to log into.
    async fn authenticate(&self, ctx: &JobContext) -> bool {
        let Some(credentials) = ctx.credentials() else {
            return true;
        };
        let system = &ctx.config().system;
        let Some(login) = ctx.services().settings.password_login.get(system) else {
            error!(job = %self.name(), system = %system, "No password login configured for system");
            return false;
        };

        let mut slot = ctx.driver_slot().lock().await;
        let Some(driver) = slot.as_mut() else {
            error!(job = %self.name(), "Password login needs a browser session");
            return false;
        };

        info!(job = %self.name(), system = %system, "Logging in");
        PasswordAuthenticator::new(login.clone())
            .authenticate(driver.as_mut(), credentials)
            .await
    }

    /// Process the job's records. Runs after a successful setup.
    async fn execute(&self, ctx: Arc<JobContext>) -> Result<(), JobError>;
}
