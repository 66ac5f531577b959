use gameflowcore::{
    Config, ExternalEvent, FlowNode, GraphError, NodeCategory, NodeContext, PinLayout,
    TimerHandle, Value,
};
use gameflowruntime::{NodeFactory, NodeMetadata, PortDefinition};
use std::time::Duration;

pub const TIMER_NODE_TYPE: &str = "time.timer";

/// Latent countdown driven by the world's timer service.
///
/// `Start` arms a completion timer of `time` seconds and, when `step_time`
/// is positive, a repeating step timer. The node stays active until the
/// countdown completes or is skipped. `Stop` pauses without leaving so a
/// later `Resume` can continue where it left off.
#[derive(Debug, Clone)]
pub struct TimerNode {
    time: f64,
    step_time: f64,
    looping: bool,
    completion: Option<TimerHandle>,
    step: Option<TimerHandle>,
    completions: u32,
}

impl TimerNode {
    pub fn new(time: f64, step_time: f64, looping: bool) -> Self {
        Self {
            time,
            step_time,
            looping,
            completion: None,
            step: None,
            completions: 0,
        }
    }

    /// Times the completion timer fired since the last `Start`.
    pub fn completions(&self) -> u32 {
        self.completions
    }

    fn clear_timers(&mut self, ctx: &NodeContext<'_>) {
        if let Some(handle) = self.step.take() {
            ctx.timers().clear_timer(handle);
        }
        if let Some(handle) = self.completion.take() {
            ctx.timers().clear_timer(handle);
        }
    }

    fn start(&mut self, ctx: &mut NodeContext<'_>) {
        self.clear_timers(ctx);
        self.completions = 0;

        if self.time <= 0.0 {
            ctx.finish_execute("Completed", true);
            return;
        }

        let owner = ctx.subscriber();
        if self.step_time > 0.0 {
            let interval = seconds(self.step_time);
            self.step = Some(ctx.timers().set_timer(owner, interval, true));
        }
        let duration = seconds(self.time);
        self.completion = Some(ctx.timers().set_timer(owner, duration, self.looping));
        tracing::debug!(
            "Timer node {} started: {:?} (step {:?}, looping {})",
            ctx.node_id(),
            duration,
            self.step_time,
            self.looping
        );
    }

    fn for_each_handle(&self, mut apply: impl FnMut(TimerHandle)) {
        self.step.into_iter().chain(self.completion).for_each(&mut apply);
    }
}

/// Positive seconds as a duration, saturating at `Duration::MAX`.
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
}

impl FlowNode for TimerNode {
    fn node_type(&self) -> &str {
        TIMER_NODE_TYPE
    }

    fn category(&self) -> NodeCategory {
        NodeCategory::Latent
    }

    fn default_pins(&self) -> PinLayout {
        PinLayout::new(
            ["Start", "Stop", "Skip", "Resume"],
            ["Completed", "Step", "Skipped", "Stopped"],
        )
    }

    fn execute(&mut self, pin: &str, ctx: &mut NodeContext<'_>) {
        match pin {
            "Start" => self.start(ctx),
            "Stop" => {
                self.for_each_handle(|handle| ctx.timers().pause_timer(handle));
                ctx.trigger_output("Stopped");
            }
            "Resume" => {
                self.for_each_handle(|handle| ctx.timers().unpause_timer(handle));
            }
            "Skip" => {
                self.clear_timers(ctx);
                ctx.finish_execute("Skipped", true);
            }
            other => {
                tracing::warn!("Timer node {} has no input '{}'", ctx.node_id(), other);
            }
        }
    }

    fn on_event(&mut self, event: &ExternalEvent, ctx: &mut NodeContext<'_>) {
        let ExternalEvent::TimerFired(handle) = event else {
            return;
        };
        if self.step == Some(*handle) {
            ctx.trigger_output("Step");
        } else if self.completion == Some(*handle) {
            self.completions += 1;
            if self.looping {
                ctx.trigger_output("Completed");
            } else {
                // The service already dropped the one-shot timer.
                self.completion = None;
                self.clear_timers(ctx);
                ctx.finish_execute("Completed", true);
            }
        }
    }

    fn on_finish_execute(&mut self, ctx: &mut NodeContext<'_>) {
        self.clear_timers(ctx);
    }

    fn config(&self) -> Config {
        Config::from([
            ("time".to_string(), Value::from(self.time)),
            ("step_time".to_string(), Value::from(self.step_time)),
            ("looping".to_string(), Value::from(self.looping)),
        ])
    }

    fn clone_node(&self) -> Box<dyn FlowNode> {
        Box::new(TimerNode::new(self.time, self.step_time, self.looping))
    }

    fn breaks_cascade(&self) -> bool {
        true
    }

    fn debug_info(&self) -> Option<String> {
        match self.completion {
            Some(_) => Some(format!("running ({:.2}s)", self.time)),
            None if self.completions > 0 => Some(format!("completed x{}", self.completions)),
            None => Some(format!("idle ({:.2}s)", self.time)),
        }
    }
}

pub struct TimerNodeFactory;

fn duration_field(config: &Config, key: &str, default: f64) -> Result<f64, GraphError> {
    match config.get(key) {
        None => Ok(default),
        Some(value) => match value.as_f64() {
            Some(seconds) if seconds.is_finite() => Ok(seconds),
            _ => Err(GraphError::Configuration(format!(
                "'{}' must be a finite number of seconds",
                key
            ))),
        },
    }
}

impl NodeFactory for TimerNodeFactory {
    fn create(&self, config: &Config) -> Result<Box<dyn FlowNode>, GraphError> {
        let time = duration_field(config, "time", 1.0)?;
        let step_time = duration_field(config, "step_time", 0.0)?;
        let looping = config.get("looping").and_then(Value::as_bool).unwrap_or(false);
        Ok(Box::new(TimerNode::new(time, step_time, looping)))
    }

    fn node_type(&self) -> &str {
        TIMER_NODE_TYPE
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Fires Completed after a delay, with optional Step ticks".to_string(),
            category: NodeCategory::Latent,
            inputs: vec![
                PortDefinition::new("Start", "Arm the timer, restarting it if running"),
                PortDefinition::new("Stop", "Pause the timer"),
                PortDefinition::new("Skip", "Cancel and fire Skipped"),
                PortDefinition::new("Resume", "Continue a paused timer"),
            ],
            outputs: vec![
                PortDefinition::new("Completed", "The delay elapsed"),
                PortDefinition::new("Step", "A step interval elapsed"),
                PortDefinition::new("Skipped", "Skip was triggered"),
                PortDefinition::new("Stopped", "Stop was triggered"),
            ],
            ..Default::default()
        }
    }
}
