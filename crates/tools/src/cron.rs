//! Cron tools — let the agent schedule recurring prompts for itself.
//!
//! Jobs live in a [`ScheduleBook`]. Firing them is the host's concern: it
//! polls [`ScheduleBook::due`] and feeds each prompt back into the runtime.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Timelike, Utc};
use parley_core::error::ToolError;
use parley_core::tool::{ToolContext, ToolDescriptor, ToolGroup, required_str};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

/// A recurring prompt owned by one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: String,
    pub agent_id: String,
    /// 5-field cron expression or a macro such as `@daily`
    pub schedule: String,
    pub prompt: String,
    pub created_at: DateTime<Utc>,
}

/// Storage for scheduled jobs.
#[async_trait]
pub trait ScheduleBook: Send + Sync {
    async fn add(&self, job: ScheduledJob) -> Result<(), ToolError>;

    /// Jobs owned by an agent, oldest first.
    async fn list(&self, agent_id: &str) -> Result<Vec<ScheduledJob>, ToolError>;

    /// Remove a job. Returns false when the agent owns no job with that id.
    async fn remove(&self, agent_id: &str, id: &str) -> Result<bool, ToolError>;

    /// Every job whose schedule matches `now` (minute resolution).
    async fn due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledJob>, ToolError>;
}

/// A [`ScheduleBook`] that keeps jobs in process memory.
#[derive(Default)]
pub struct InMemoryScheduleBook {
    jobs: RwLock<BTreeMap<String, ScheduledJob>>,
}

impl InMemoryScheduleBook {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScheduleBook for InMemoryScheduleBook {
    async fn add(&self, job: ScheduledJob) -> Result<(), ToolError> {
        self.jobs.write().await.insert(job.id.clone(), job);
        Ok(())
    }

    async fn list(&self, agent_id: &str) -> Result<Vec<ScheduledJob>, ToolError> {
        let mut jobs: Vec<ScheduledJob> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|j| j.agent_id == agent_id)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    async fn remove(&self, agent_id: &str, id: &str) -> Result<bool, ToolError> {
        let mut jobs = self.jobs.write().await;
        match jobs.get(id) {
            Some(job) if job.agent_id == agent_id => {
                jobs.remove(id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledJob>, ToolError> {
        Ok(self
            .jobs
            .read()
            .await
            .values()
            .filter(|j| CronExpr::parse(&j.schedule).is_ok_and(|expr| expr.matches(&now)))
            .cloned()
            .collect())
    }
}

// ── Cron expression parser ──────────────────────────────────────────────────

/// A parsed 5-field cron expression: minute hour dom month dow.
#[derive(Debug, Clone)]
pub struct CronExpr {
    minutes: Vec<u32>,
    hours: Vec<u32>,
    days_of_month: Vec<u32>,
    months: Vec<u32>,
    days_of_week: Vec<u32>, // 0=Sun
}

impl CronExpr {
    /// Parse a 5-field expression or one of `@hourly`, `@daily`, `@weekly`,
    /// `@monthly`.
    ///
    /// Fields support `*`, `*/N`, `N`, `N-M`, `N-M/S` and comma lists.
    pub fn parse(expr: &str) -> Result<Self, String> {
        let expr = match expr.trim() {
            "@hourly" => "0 * * * *",
            "@daily" | "@midnight" => "0 0 * * *",
            "@weekly" => "0 0 * * 0",
            "@monthly" => "0 0 1 * *",
            other if other.starts_with('@') => return Err(format!("Unknown macro: {other}")),
            other => other,
        };

        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(format!(
                "Expected 5 fields (minute hour dom month dow), got {}",
                fields.len()
            ));
        }

        Ok(CronExpr {
            minutes: Self::parse_field(fields[0], 0, 59)?,
            hours: Self::parse_field(fields[1], 0, 23)?,
            days_of_month: Self::parse_field(fields[2], 1, 31)?,
            months: Self::parse_field(fields[3], 1, 12)?,
            days_of_week: Self::parse_field(fields[4], 0, 6)?,
        })
    }

    fn parse_field(field: &str, min: u32, max: u32) -> Result<Vec<u32>, String> {
        let mut values = Vec::new();

        for part in field.split(',') {
            let (span, step) = match part.split_once('/') {
                Some((span, step)) => {
                    let step: u32 = step.parse().map_err(|_| format!("Invalid step: {step}"))?;
                    if step == 0 {
                        return Err("Step cannot be zero".into());
                    }
                    (span, step)
                }
                None => (part, 1),
            };

            let (start, end) = if span == "*" {
                (min, max)
            } else if span.contains('-') {
                Self::parse_range(span, min, max)?
            } else {
                let v: u32 = span.parse().map_err(|_| format!("Invalid number: {span}"))?;
                if v < min || v > max {
                    return Err(format!("{v} out of range {min}-{max}"));
                }
                // "N/S" runs from N to the end of the field
                if part.contains('/') { (v, max) } else { (v, v) }
            };

            values.extend((start..=end).step_by(step as usize));
        }

        values.sort_unstable();
        values.dedup();
        if values.is_empty() {
            return Err("Field produced no values".into());
        }
        Ok(values)
    }

    fn parse_range(s: &str, min: u32, max: u32) -> Result<(u32, u32), String> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| format!("Invalid range: {s}"))?;
        let start: u32 = start.parse().map_err(|_| format!("Invalid range start: {start}"))?;
        let end: u32 = end.parse().map_err(|_| format!("Invalid range end: {end}"))?;
        if start < min || end > max || start > end {
            return Err(format!("Range {start}-{end} invalid for {min}-{max}"));
        }
        Ok((start, end))
    }

    /// Whether the given instant falls on this schedule.
    pub fn matches(&self, dt: &DateTime<Utc>) -> bool {
        self.minutes.contains(&dt.minute())
            && self.hours.contains(&dt.hour())
            && self.days_of_month.contains(&dt.day())
            && self.months.contains(&dt.month())
            && self.days_of_week.contains(&dt.weekday().num_days_from_sunday())
    }
}

// ── Tool group ──────────────────────────────────────────────────────────────

/// `cron_create`, `cron_list` and `cron_delete`.
pub struct CronTools {
    book: Arc<dyn ScheduleBook>,
}

impl CronTools {
    pub fn new(book: Arc<dyn ScheduleBook>) -> Self {
        Self { book }
    }

    async fn create(&self, arguments: &serde_json::Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let schedule = required_str(arguments, "schedule")?;
        let prompt = required_str(arguments, "prompt")?;

        CronExpr::parse(schedule)
            .map_err(|e| ToolError::InvalidArguments(format!("Invalid schedule '{schedule}': {e}")))?;

        let job = ScheduledJob {
            id: uuid::Uuid::new_v4().to_string(),
            agent_id: ctx.agent_id.clone(),
            schedule: schedule.trim().to_string(),
            prompt: prompt.to_string(),
            created_at: Utc::now(),
        };
        info!(agent_id = %ctx.agent_id, job_id = %job.id, schedule = %job.schedule, "Scheduled job created");

        let reply = format!("Scheduled job {} ({})", job.id, job.schedule);
        self.book.add(job).await?;
        Ok(reply)
    }

    async fn list(&self, ctx: &ToolContext) -> Result<String, ToolError> {
        let jobs = self.book.list(&ctx.agent_id).await?;
        if jobs.is_empty() {
            return Ok("No scheduled jobs.".into());
        }
        let lines: Vec<String> = jobs
            .iter()
            .map(|j| format!("- {} [{}] {}", j.id, j.schedule, j.prompt))
            .collect();
        Ok(lines.join("\n"))
    }

    async fn delete(&self, arguments: &serde_json::Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let id = required_str(arguments, "id")?;
        if self.book.remove(&ctx.agent_id, id).await? {
            Ok(format!("Deleted job {id}"))
        } else {
            Err(ToolError::ExecutionFailed {
                tool_name: "cron_delete".into(),
                reason: format!("No scheduled job with id '{id}'"),
            })
        }
    }
}

#[async_trait]
impl ToolGroup for CronTools {
    fn group(&self) -> &str {
        "cron"
    }

    fn descriptors(&self) -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor::new(
                "cron_create",
                "Schedule a recurring prompt. Use a 5-field cron expression \
                 (minute hour day month weekday) or @hourly, @daily, @weekly, @monthly.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "schedule": { "type": "string", "description": "Cron expression" },
                        "prompt": { "type": "string", "description": "What to do when the job fires" }
                    },
                    "required": ["schedule", "prompt"]
                }),
            ),
            ToolDescriptor::new(
                "cron_list",
                "List your scheduled jobs.",
                serde_json::json!({ "type": "object", "properties": {} }),
            ),
            ToolDescriptor::new(
                "cron_delete",
                "Delete a scheduled job by id.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "id": { "type": "string", "description": "Job id from cron_list" }
                    },
                    "required": ["id"]
                }),
            ),
        ]
    }

    async fn execute(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<String, ToolError> {
        match tool_name {
            "cron_create" => self.create(&arguments, ctx).await,
            "cron_list" => self.list(ctx).await,
            "cron_delete" => self.delete(&arguments, ctx).await,
            other => Err(ToolError::NotFound(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn tools() -> (CronTools, Arc<InMemoryScheduleBook>) {
        let book = Arc::new(InMemoryScheduleBook::new());
        (CronTools::new(book.clone()), book)
    }

    #[test]
    fn cron_expr_specific_time() {
        let expr = CronExpr::parse("30 9 * * 1-5").unwrap();
        // 2026-10-19 is a Monday
        let monday = Utc.with_ymd_and_hms(2026, 10, 19, 9, 30, 0).unwrap();
        let sunday = Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap();
        assert!(expr.matches(&monday));
        assert!(!expr.matches(&sunday));
    }

    #[test]
    fn cron_expr_steps_and_lists() {
        let expr = CronExpr::parse("*/15 8,20 * * *").unwrap();
        assert_eq!(expr.minutes, vec![0, 15, 30, 45]);
        assert_eq!(expr.hours, vec![8, 20]);

        let ranged = CronExpr::parse("10-30/10 * * * *").unwrap();
        assert_eq!(ranged.minutes, vec![10, 20, 30]);
    }

    #[test]
    fn cron_macros() {
        let daily = CronExpr::parse("@daily").unwrap();
        assert!(daily.matches(&Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).unwrap()));
        assert!(!daily.matches(&Utc.with_ymd_and_hms(2026, 1, 5, 1, 0, 0).unwrap()));
        assert!(CronExpr::parse("@yearly-ish").is_err());
    }

    #[test]
    fn invalid_expressions_rejected() {
        assert!(CronExpr::parse("not a cron").is_err());
        assert!(CronExpr::parse("60 * * * *").is_err());
        assert!(CronExpr::parse("*/0 * * * *").is_err());
        assert!(CronExpr::parse("5-1 * * * *").is_err());
    }

    #[tokio::test]
    async fn create_list_delete() {
        let (tools, _) = tools();
        let ctx = ToolContext::for_agent("a1");

        let created = tools
            .execute(
                "cron_create",
                serde_json::json!({"schedule": "0 9 * * *", "prompt": "Send the daily digest"}),
                &ctx,
            )
            .await
            .unwrap();
        let id = created
            .strip_prefix("Scheduled job ")
            .and_then(|rest| rest.split_whitespace().next())
            .unwrap()
            .to_string();

        let listed = tools.execute("cron_list", serde_json::json!({}), &ctx).await.unwrap();
        assert!(listed.contains("daily digest"));

        let other = tools
            .execute("cron_list", serde_json::json!({}), &ToolContext::for_agent("a2"))
            .await
            .unwrap();
        assert_eq!(other, "No scheduled jobs.");

        // Another agent cannot delete it
        assert!(tools
            .execute("cron_delete", serde_json::json!({"id": id}), &ToolContext::for_agent("a2"))
            .await
            .is_err());

        let deleted = tools
            .execute("cron_delete", serde_json::json!({"id": id}), &ctx)
            .await
            .unwrap();
        assert!(deleted.starts_with("Deleted"));
        assert_eq!(
            tools.execute("cron_list", serde_json::json!({}), &ctx).await.unwrap(),
            "No scheduled jobs."
        );
    }

    #[tokio::test]
    async fn create_rejects_bad_schedule() {
        let (tools, _) = tools();
        let err = tools
            .execute(
                "cron_create",
                serde_json::json!({"schedule": "every tuesday", "prompt": "x"}),
                &ToolContext::for_agent("a1"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn due_jobs_match_current_minute() {
        let (tools, book) = tools();
        tools
            .execute(
                "cron_create",
                serde_json::json!({"schedule": "@hourly", "prompt": "check inbox"}),
                &ToolContext::for_agent("a1"),
            )
            .await
            .unwrap();

        let on_hour = Utc.with_ymd_and_hms(2026, 3, 1, 14, 0, 0).unwrap();
        let off_hour = Utc.with_ymd_and_hms(2026, 3, 1, 14, 1, 0).unwrap();
        assert_eq!(book.due(on_hour).await.unwrap().len(), 1);
        assert!(book.due(off_hour).await.unwrap().is_empty());
    }
}
