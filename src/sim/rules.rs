//! Legality of agent actions: how much may change in one step and when an
//! element can be acted on again.

use crate::action::{BaseAction, IllegalAction, TopologicalImpact};

/// Limits on topology changes.
#[derive(Debug, Clone, PartialEq)]
pub struct GameRules {
    /// Lines whose status may change in one step.
    pub max_line_status_changed: usize,
    /// Substations whose topology may change in one step.
    pub max_sub_changed: usize,
    /// Steps a line stays locked after being acted on.
    pub line_cooldown: u32,
    /// Steps a substation stays locked after being acted on.
    pub sub_cooldown: u32,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            max_line_status_changed: 1,
            max_sub_changed: 1,
            line_cooldown: 0,
            sub_cooldown: 0,
        }
    }
}

/// State of the grid the rules look at.
#[derive(Debug, Clone, Copy)]
pub struct RulesContext<'a> {
    pub line_status: &'a [bool],
    pub cooldown_line: &'a [u32],
    pub cooldown_sub: &'a [u32],
    /// Lines out for maintenance or a hazard.
    pub forced_out: &'a [bool],
}

impl GameRules {
    /// Returns the topological impact of a legal action.
    pub fn check(
        &self,
        action: &BaseAction,
        ctx: &RulesContext<'_>,
    ) -> Result<TopologicalImpact, IllegalAction> {
        let impact = action.topological_impact(Some(ctx.line_status));
        if impact.n_lines() > self.max_line_status_changed {
            return Err(IllegalAction(format!(
                "{} line status changes requested, at most {} allowed",
                impact.n_lines(),
                self.max_line_status_changed
            )));
        }
        if impact.n_subs() > self.max_sub_changed {
            return Err(IllegalAction(format!(
                "{} substations modified, at most {} allowed",
                impact.n_subs(),
                self.max_sub_changed
            )));
        }
        let lines = impact.lines.iter().enumerate().filter(|(_, hit)| **hit);
        for (l, _) in lines {
            if ctx.forced_out.get(l).copied().unwrap_or(false) {
                return Err(IllegalAction(format!(
                    "line {l} is under maintenance or hazard"
                )));
            }
            if let Some(remaining) = ctx.cooldown_line.get(l).filter(|c| **c > 0) {
                return Err(IllegalAction(format!(
                    "line {l} is in cooldown for {remaining} more steps"
                )));
            }
        }
        for (s, hit) in impact.subs.iter().enumerate() {
            if !hit {
                continue;
            }
            if let Some(remaining) = ctx.cooldown_sub.get(s).filter(|c| **c > 0) {
                return Err(IllegalAction(format!(
                    "substation {s} is in cooldown for {remaining} more steps"
                )));
            }
        }
        Ok(impact)
    }

    /// Ticks every cooldown and locks what `impact` touched.
    pub fn update_cooldowns(
        &self,
        impact: &TopologicalImpact,
        cooldown_line: &mut [u32],
        cooldown_sub: &mut [u32],
    ) {
        for (c, hit) in cooldown_line.iter_mut().zip(&impact.lines) {
            *c = if *hit { self.line_cooldown } else { c.saturating_sub(1) };
        }
        for (c, hit) in cooldown_sub.iter_mut().zip(&impact.subs) {
            *c = if *hit { self.sub_cooldown } else { c.saturating_sub(1) };
        }
    }
}
