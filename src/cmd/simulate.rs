//! Load simulation command: `supportdesk simulate`.

use std::time::Duration;

use anyhow::Result;

use supportdesk::config::SupportConfig;
use supportdesk::support::db::{DbHandle, SupportDb};
use supportdesk::support::simulator::EmailBot;

use super::super::SimulateMode;

pub async fn cmd_simulate(
    config: &SupportConfig,
    mode: SimulateMode,
    base_url: &str,
    scenarios: bool,
) -> Result<()> {
    let db = DbHandle::new(SupportDb::new(&config.database.path)?);
    let bot = EmailBot::new(base_url, db)?.with_scenarios(scenarios);

    let stats = match mode {
        SimulateMode::Steady {
            minutes,
            per_minute,
        } => {
            println!(
                "Steady simulation: {} min, {} msg/min, ~{} messages planned against {}",
                minutes,
                per_minute,
                minutes.saturating_mul(u64::from(per_minute)),
                base_url
            );
            bot.run_steady(steady_duration(minutes), per_minute).await?
        }
        SimulateMode::Burst { count } => {
            println!("Burst simulation: {} concurrent messages against {}", count, base_url);
            bot.run_burst(count).await?
        }
        SimulateMode::Once => bot.run_once().await?,
    };

    println!();
    println!("{}", stats);
    Ok(())
}

/// Very large minute counts saturate instead of overflowing.
fn steady_duration(minutes: u64) -> Duration {
    Duration::from_secs(minutes.saturating_mul(60))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steady_duration() {
        assert_eq!(steady_duration(30), Duration::from_secs(1800));
        assert_eq!(steady_duration(u64::MAX), Duration::from_secs(u64::MAX));
    }
}
