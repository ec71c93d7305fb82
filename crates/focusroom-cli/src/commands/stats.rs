use clap::Subcommand;
use focusroom_core::storage::Database;

#[derive(Subcommand)]
pub enum StatsAction {
    /// Today's stats
    Today,
    /// All-time stats
    All,
    /// Most recent time log entries
    Log {
        /// Number of entries to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

pub fn run(action: StatsAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;

    match action {
        StatsAction::Today => {
            let stats = db.stats_today()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        StatsAction::All => {
            let stats = db.stats_all()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        StatsAction::Log { limit } => {
            let logs = db.recent_logs(limit)?;
            println!("{}", serde_json::to_string_pretty(&logs)?);
        }
    }
    Ok(())
}
