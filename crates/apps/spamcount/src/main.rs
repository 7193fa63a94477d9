//! spamcount - Count Gmail spam by day
//!
//! Signs in to Gmail, tallies messages under the SPAM label for the past
//! 31 days and prints one line per day.

use anyhow::Result;
use chrono::Local;
use log::{error, info};
use mail::{
    BatchResolver, DailyCounts, DateHeaderResolver, DateResolver, GmailAuth, GmailClient,
    GmailCredentials, InternalDateResolver, SPAM_LABEL, WINDOW_DAYS, tally,
};

mod args;
mod progress;

use args::{Args, Strategy};
use clap::Parser;
use progress::Spinner;

fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp_millis()
        .init();

    // Bootstrap config directory
    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    let args = Args::parse();

    let token_path = match args.token {
        Some(path) => path,
        None => GmailAuth::default_token_path()?,
    };
    let credentials_path = match args.credentials {
        Some(path) => path,
        None => GmailCredentials::default_credentials_path()?,
    };
    let auth = GmailAuth::new(credentials_path, token_path);

    if args.logout {
        auth.logout()?;
        println!("Removed stored credential {}", auth.token_path().display());
        return Ok(());
    }

    let credential = auth.obtain_credential()?;
    let client = GmailClient::from_credential(&credential);

    let resolver: Box<dyn DateResolver> = match args.strategy {
        Strategy::Full => Box::new(InternalDateResolver::new()),
        Strategy::Batch => Box::new(BatchResolver::new()),
        Strategy::Header => Box::new(DateHeaderResolver::new()),
    };
    info!("Counting {} messages using {:?} strategy", SPAM_LABEL, args.strategy);

    let today = Local::now().date_naive();
    let mut spinner = Spinner::new(args.quiet);

    match tally(&client, resolver.as_ref(), SPAM_LABEL, today, &mut spinner) {
        Ok(counts) if counts.is_empty() => println!("No spam messages found."),
        Ok(counts) => {
            println!("Spam email counts for the past {} days:", WINDOW_DAYS);
            for line in format_counts(&counts) {
                println!("{}", line);
            }
        }
        Err(e) => println!("An error occurred: {}", e),
    }

    Ok(())
}

/// One `"<Ddd> <YYYY-MM-DD>: <count>"` line per date, oldest first
fn format_counts(counts: &DailyCounts) -> Vec<String> {
    counts
        .iter()
        .map(|(date, count)| format!("{} {}: {}", date.format("%a"), date, count))
        .collect()
}
