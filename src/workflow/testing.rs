//! Shared fixtures for stage tests.
use super::Session;
use crate::config::PollingConfig;
use crate::outputs::testing::MemoryOutputs;
use crate::poll::tests::RecordingSleeper;
use crate::poll::PollPolicy;
use crate::transport::testing::ScriptedTransport;
use std::time::Duration;

pub(crate) struct Harness {
    pub(crate) transport: ScriptedTransport,
    pub(crate) sleeper: RecordingSleeper,
    pub(crate) outputs: MemoryOutputs,
    pub(crate) polling: PollingConfig,
}

impl Harness {
    pub(crate) fn new() -> Self {
        Self {
            transport: ScriptedTransport::default(),
            sleeper: RecordingSleeper::default(),
            outputs: MemoryOutputs::default(),
            polling: PollingConfig {
                upload: PollPolicy::fixed(3, Duration::from_millis(7)),
                generation: PollPolicy::fixed(3, Duration::from_millis(5)),
                validation_interval: Duration::from_secs(60),
            },
        }
    }

    pub(crate) fn session(&self) -> Session<'_> {
        Session::new(&self.transport, &self.sleeper, &self.outputs, self.polling)
    }
}
