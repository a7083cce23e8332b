//! Trigger nodes

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use cron::Schedule;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

use crate::context::Context;
use crate::error::{FlowError, Result};
use crate::node::{ArgSpecs, ArgType, BuildNode, Node, NodeCore, NodeInit, Params};

/// Runs its child forever, every `interval` seconds, each time on fresh
/// flowdata
#[derive(Debug)]
pub struct IntervalNode {
    core: NodeCore,
}

impl IntervalNode {
    fn period(&self, params: &Params) -> Result<Duration> {
        let secs = params.f64("interval")?;
        match Duration::try_from_secs_f64(secs) {
            Ok(period) if !period.is_zero() => Ok(period),
            _ => Err(FlowError::invalid_parameter(
                self.name(),
                "interval",
                "must be a positive number of seconds within range",
            )),
        }
    }
}

impl BuildNode for IntervalNode {
    fn arg_specs() -> ArgSpecs {
        ArgSpecs::new().required("interval", ArgType::Float)
    }

    fn build(init: &NodeInit<'_>) -> Result<Self> {
        Ok(Self {
            core: NodeCore::new(init, Self::arg_specs())?,
        })
    }
}

#[async_trait]
impl Node for IntervalNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    async fn process(&self, params: &Params, ctx: &mut Context) -> Result<()> {
        let mut ticker = tokio::time::interval(self.period(params)?);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            trace!(node = %self.name(), "tick");
            ctx.reset_flowdata();
            self.core.run_child(ctx).await?;
        }
    }

    /// The child is driven from `process`
    async fn run(&self, ctx: &mut Context) -> Result<()> {
        self.run_self(ctx).await
    }
}

/// Parse a five-field cron string: `minute hour day month day_of_week`
///
/// Fields accept `*`, lists, ranges and steps. Day of week is best written by
/// name (`MON-FRI`); numeric days count from Sunday = 1.
pub fn parse_cron(cron: &str) -> std::result::Result<Schedule, String> {
    let fields = cron.split_whitespace().count();
    if fields != 5 {
        return Err(format!(
            "expected 'minute hour day month day_of_week', got {} fields",
            fields
        ));
    }
    Schedule::from_str(&format!("0 {}", cron)).map_err(|e| e.to_string())
}

/// Runs its child at every firing of a cron schedule (local time), each
/// time on fresh flowdata
#[derive(Debug)]
pub struct SchedulerNode {
    core: NodeCore,
}

impl BuildNode for SchedulerNode {
    fn arg_specs() -> ArgSpecs {
        ArgSpecs::new().required("cron", ArgType::Str)
    }

    fn build(init: &NodeInit<'_>) -> Result<Self> {
        Ok(Self {
            core: NodeCore::new(init, Self::arg_specs())?,
        })
    }
}

#[async_trait]
impl Node for SchedulerNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    async fn process(&self, params: &Params, ctx: &mut Context) -> Result<()> {
        let cron = params.str("cron")?;
        let schedule =
            parse_cron(cron).map_err(|e| FlowError::invalid_parameter(self.name(), "cron", e))?;
        debug!(node = %self.name(), cron, "schedule armed");

        loop {
            let Some(next) = schedule.upcoming(Local).next() else {
                warn!(node = %self.name(), cron, "schedule has no further firings");
                return Ok(());
            };
            let wait = (next - Local::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::time::sleep(wait).await;

            trace!(node = %self.name(), at = %next, "fire");
            ctx.reset_flowdata();
            self.core.run_child(ctx).await?;
        }
    }

    /// The child is driven from `process`
    async fn run(&self, ctx: &mut Context) -> Result<()> {
        self.run_self(ctx).await
    }
}
