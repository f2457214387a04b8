use std::convert::TryFrom;
use tokio::time::Duration;

#[derive(Clone, Debug, Default)]
pub struct UpgradeOptions {
    /// How long followers may take to catch up with the leader, from the start of a replicaset's
    /// upgrade. Also bounds every single remote call.
    pub timeout: Option<Duration>,
    pub poll_interval: Option<Duration>,
}

#[derive(Clone, Debug)]
pub(super) struct UpgradeOptionsValidated {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl UpgradeOptionsValidated {
    fn validate(&self) -> Result<(), &'static str> {
        if self.poll_interval == Duration::from_secs(0) {
            return Err("Poll interval must be positive");
        }
        if self.poll_interval >= self.timeout {
            return Err("Poll interval must be less than the timeout");
        }

        Ok(())
    }
}

impl TryFrom<UpgradeOptions> for UpgradeOptionsValidated {
    type Error = &'static str;

    fn try_from(options: UpgradeOptions) -> Result<Self, Self::Error> {
        let values = UpgradeOptionsValidated {
            timeout: options.timeout.unwrap_or(Duration::from_secs(5)),
            poll_interval: options.poll_interval.unwrap_or(Duration::from_secs(1)),
        };

        values.validate()?;
        Ok(values)
    }
}
