use crate::observe::Observation;

/// State a handler may read, and the observation it may replace.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    iteration: u32,
    observation: Option<Observation>,
    target_pid: Option<u32>,
}

impl ToolContext {
    pub fn new(target_pid: Option<u32>) -> Self {
        Self {
            iteration: 0,
            observation: None,
            target_pid,
        }
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn set_iteration(&mut self, iteration: u32) {
        self.iteration = iteration;
    }

    /// The latest captured observation, if any.
    pub fn observation(&self) -> Option<&Observation> {
        self.observation.as_ref()
    }

    pub fn set_observation(&mut self, observation: Option<Observation>) {
        self.observation = observation;
    }

    pub fn target_pid(&self) -> Option<u32> {
        self.target_pid
    }
}
