//! Background job scheduling.
//!
//! Two independent timer-driven jobs, no shared in-process state:
//! - a daily follow-up job on a fixed cron schedule
//! - inbound processing at a few randomized times per weekday,
//!   re-drawn each midnight

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Local, NaiveTime, Weekday};
use cron::Schedule;
use rand::Rng;
use tokio::task::JoinHandle;

use crate::campaign::Campaign;
use crate::config::ScheduleConfig;
use crate::error::ConfigError;
use crate::pipeline::InboundPipeline;

/// Spawn the daily follow-up job on the given cron expression
/// (sec min hour dom mon dow).
pub fn spawn_followup_job(
    campaign: Arc<Campaign>,
    cron_expr: &str,
) -> Result<JoinHandle<()>, ConfigError> {
    let schedule = Schedule::from_str(cron_expr).map_err(|e| ConfigError::InvalidValue {
        key: "FOLLOWUP_CRON".into(),
        message: e.to_string(),
    })?;

    Ok(tokio::spawn(async move {
        loop {
            let Some(next) = schedule.upcoming(Local).next() else {
                tracing::warn!("Follow-up schedule has no future fire times; job exiting");
                return;
            };
            tracing::debug!(next = %next, "Follow-up job sleeping until next fire");
            sleep_until_local(next).await;

            match campaign.run_followups().await {
                Ok(n) => tracing::info!(processed = n, "Scheduled follow-up job finished"),
                Err(e) => tracing::error!(error = %e, "Scheduled follow-up job failed"),
            }
        }
    }))
}

/// Spawn the inbound processing job: a few randomized send-windows per
/// weekday, re-drawn at midnight; weekends are skipped.
pub fn spawn_inbound_job(
    pipeline: Arc<InboundPipeline>,
    config: ScheduleConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let today = Local::now();
            if is_weekend(today.weekday()) {
                tracing::info!("Weekend — no inbound runs scheduled today");
            } else {
                let windows = {
                    let mut rng = rand::thread_rng();
                    draw_windows(
                        &mut rng,
                        config.inbound_base_hour,
                        config.inbound_runs_per_day,
                    )
                };
                tracing::info!(?windows, "Inbound runs scheduled for today");

                for time in windows {
                    let Some(fire) = today
                        .date_naive()
                        .and_time(time)
                        .and_local_timezone(Local)
                        .single()
                    else {
                        continue;
                    };
                    if fire <= Local::now() {
                        continue;
                    }
                    sleep_until_local(fire).await;

                    match pipeline.process_inbox().await {
                        Ok(n) => tracing::info!(processed = n, "Inbound run finished"),
                        Err(e) => tracing::error!(error = %e, "Inbound run failed"),
                    }
                }
            }

            sleep_until_local(next_midnight()).await;
        }
    })
}

/// Draw ascending run times: window `i` lands between `base + 3i` and
/// `base + 3i + 3` hours, with a random minute.
fn draw_windows(rng: &mut impl Rng, base_hour: u32, runs: u32) -> Vec<NaiveTime> {
    (0..runs)
        .filter_map(|i| {
            let hour = (base_hour + rng.gen_range(0..=3) + i * 3).min(23);
            let minute = rng.gen_range(0..60);
            NaiveTime::from_hms_opt(hour, minute, 0)
        })
        .collect()
}

fn is_weekend(day: Weekday) -> bool {
    matches!(day, Weekday::Sat | Weekday::Sun)
}

fn next_midnight() -> DateTime<Local> {
    (Local::now().date_naive() + chrono::Days::new(1))
        .and_time(NaiveTime::MIN)
        .and_local_timezone(Local)
        .earliest()
        .unwrap_or_else(Local::now)
}

async fn sleep_until_local(when: DateTime<Local>) {
    if let Ok(delay) = (when - Local::now()).to_std() {
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn default_followup_cron_parses() {
        let schedule = Schedule::from_str("0 0 9 * * *").unwrap();
        assert!(schedule.upcoming(Local).next().is_some());
    }

    #[test]
    fn windows_land_in_their_hour_bands() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let windows = draw_windows(&mut rng, 9, 3);
            assert_eq!(windows.len(), 3);
            for (i, time) in windows.iter().enumerate() {
                let base = 9 + 3 * i as u32;
                assert!(
                    (base..=base + 3).contains(&chrono::Timelike::hour(time)),
                    "window {i} at {time} outside [{base}, {}]",
                    base + 3
                );
            }
        }
    }

    #[test]
    fn windows_never_pass_midnight() {
        let mut rng = StdRng::seed_from_u64(11);
        let windows = draw_windows(&mut rng, 22, 3);
        assert!(windows.iter().all(|t| chrono::Timelike::hour(t) <= 23));
    }

    #[test]
    fn weekend_detection() {
        assert!(is_weekend(Weekday::Sat));
        assert!(is_weekend(Weekday::Sun));
        assert!(!is_weekend(Weekday::Mon));
        assert!(!is_weekend(Weekday::Fri));
    }
}
