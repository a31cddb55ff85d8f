//! Ordered selection rules consulted for every target Sunday.
//!
//! The first rule that applies and proposes a psalm claims the Sunday. Rules
//! that apply but find no match pass through to the next one.

mod general;
mod select;

use chrono::NaiveDate;
use log::debug;
use rand::RngCore;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::balance::TypeBalanceStats;
use crate::calendar::Occasions;
use crate::config::SchedulerConfig;
use crate::psalm::Psalm;

pub use general::{monthly_cap, type_score};
pub use select::{select_by_theme, select_by_type_theme_or_epigraph, select_least_read};

/// Everything a rule may consult for one Sunday.
pub struct ScheduleContext<'a, 'r> {
    pub sunday: NaiveDate,
    /// Eligible psalms not yet used in this run.
    pub available: &'a [&'a Psalm],
    pub read_counts: &'a HashMap<i32, usize>,
    pub type_balances: &'a BTreeMap<String, TypeBalanceStats>,
    pub max_total_readable: usize,
    pub recent_type_counts: &'a HashMap<String, usize>,
    pub recent_total: usize,
    pub month_type_counts: HashMap<String, usize>,
    /// Types of the preceding scheduled Sundays, newest first.
    pub recent_types: Vec<Option<String>>,
    pub occasions: Occasions,
    pub config: &'a SchedulerConfig,
    pub rng: &'r mut dyn RngCore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadingRule {
    FirstSundayOfYear,
    Thanksgiving,
    HolyWeek,
    December,
    FirstSundayPraise,
    General,
}

impl ReadingRule {
    /// Evaluation order.
    pub const CHAIN: [ReadingRule; 6] = [
        ReadingRule::FirstSundayOfYear,
        ReadingRule::Thanksgiving,
        ReadingRule::HolyWeek,
        ReadingRule::December,
        ReadingRule::FirstSundayPraise,
        ReadingRule::General,
    ];

    /// Label stored on every reading this rule produces.
    pub fn name(&self) -> &'static str {
        match self {
            ReadingRule::FirstSundayOfYear => "First Sunday new year",
            ReadingRule::Thanksgiving => "Thanksgiving",
            ReadingRule::HolyWeek => "HolyWeek",
            ReadingRule::December => "Christmas season",
            ReadingRule::FirstSundayPraise => "First Sunday of worship",
            ReadingRule::General => "General",
        }
    }

    pub fn can_apply(&self, ctx: &ScheduleContext<'_, '_>) -> bool {
        let occasions = &ctx.occasions;
        match self {
            ReadingRule::FirstSundayOfYear => occasions.first_sunday_of_year,
            ReadingRule::Thanksgiving => occasions.thanksgiving,
            ReadingRule::HolyWeek => occasions.holy_week,
            ReadingRule::December => occasions.december,
            ReadingRule::FirstSundayPraise => occasions.first_sunday_of_month,
            ReadingRule::General => true,
        }
    }

    pub fn select<'a>(&self, ctx: &mut ScheduleContext<'a, '_>) -> Option<&'a Psalm> {
        let config = ctx.config;
        match self {
            ReadingRule::FirstSundayOfYear => {
                select_by_theme(ctx.available, ctx.read_counts, &config.new_year_theme, ctx.rng)
            }
            ReadingRule::Thanksgiving => select_by_theme(
                ctx.available,
                ctx.read_counts,
                &config.thanksgiving_theme,
                ctx.rng,
            ),
            ReadingRule::HolyWeek => {
                let preferred: Vec<&'a Psalm> = ctx
                    .available
                    .iter()
                    .copied()
                    .filter(|psalm| config.holy_week_psalms.contains(&psalm.id))
                    .collect();
                select_least_read(&preferred, ctx.read_counts, ctx.rng)
            }
            ReadingRule::December => select_by_type_theme_or_epigraph(
                ctx.available,
                ctx.read_counts,
                &config.december_tag,
                ctx.rng,
            ),
            ReadingRule::FirstSundayPraise => select_by_type_theme_or_epigraph(
                ctx.available,
                ctx.read_counts,
                &config.praise_tag,
                ctx.rng,
            ),
            ReadingRule::General => general::select(ctx),
        }
    }
}

impl fmt::Display for ReadingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Selection<'a> {
    pub psalm: &'a Psalm,
    pub rule: ReadingRule,
}

/// Runs the chain for one Sunday. When nothing claims it, the least-read
/// available psalm is taken and labelled General.
pub fn apply_chain<'a>(ctx: &mut ScheduleContext<'a, '_>) -> Option<Selection<'a>> {
    for rule in ReadingRule::CHAIN {
        if !rule.can_apply(ctx) {
            continue;
        }
        if let Some(psalm) = rule.select(ctx) {
            debug!("{}: {} selected psalm {}", ctx.sunday, rule, psalm.id);
            return Some(Selection { psalm, rule });
        }
        debug!("{}: {} passed", ctx.sunday, rule);
    }

    // General returns a psalm whenever any is available; this only guards
    // against a General that ever declines.
    select_least_read(ctx.available, ctx.read_counts, ctx.rng).map(|psalm| Selection {
        psalm,
        rule: ReadingRule::General,
    })
}
