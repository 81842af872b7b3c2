//! Subscription Wizard Demo
//!
//! Runs the subscription wizard end to end against the simulated WhatsApp
//! notifier and backend, then prints the result as JSON.
//!
//! Usage:
//!   cargo run --bin subscribe-demo -- --whatsapp --phone +15551234567
//!
//! Examples:
//!   # Browser alerts only
//!   cargo run --bin subscribe-demo
//!
//!   # WhatsApp with a deliberately wrong code first
//!   cargo run --bin subscribe-demo -- --whatsapp --phone +15551234567 --code 000000
//!
//!   # Keep the session between runs
//!   cargo run --bin subscribe-demo -- --session-dir .alertship

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;

use alertship::otp::RandomCodeGenerator;
use alertship::telemetry::init_tracing;
use alertship::{
    FileSessionStore, MemorySessionStore, Session, SessionStore, Shell,
    SimulatedSubscriptionService, SimulatedWhatsAppNotifier, Step, User, WizardCollaborators,
    WizardConfig, WizardEntry, WizardError, WizardExit,
};

/// Drive the AlertShip subscription wizard from the command line
#[derive(Parser, Debug)]
#[command(name = "subscribe-demo")]
#[command(about = "Subscribe to outage alerts using the simulated WhatsApp channel")]
struct Args {
    /// Turn browser alerts off
    #[arg(long)]
    no_browser: bool,

    /// Turn WhatsApp alerts on (requires --phone)
    #[arg(long)]
    whatsapp: bool,

    /// WhatsApp number to verify
    #[arg(long, short = 'p', env = "ALERTSHIP_DEMO_PHONE")]
    phone: Option<String>,

    /// Code to enter first; the delivered code is entered if this one is rejected
    #[arg(long, short = 'c')]
    code: Option<String>,

    /// Keep the session in this directory instead of in memory
    #[arg(long)]
    session_dir: Option<PathBuf>,

    /// Name used when no stored session exists
    #[arg(long, default_value = "Demo User")]
    name: String,

    /// Email used when no stored session exists
    #[arg(long, default_value = "demo@alertship.app")]
    email: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    init_tracing().context("Failed to initialize tracing")?;

    let args = Args::parse();
    let config = WizardConfig::from_env()?;

    let store: Arc<dyn SessionStore> = match &args.session_dir {
        Some(dir) => Arc::new(FileSessionStore::new(dir)),
        None => Arc::new(MemorySessionStore::new()),
    };
    let mut shell = Shell::new(Session::restore(store).await?);
    if !shell.session().is_logged_in() {
        shell
            .log_in(User::new(args.name.as_str(), args.email.as_str()))
            .await?;
    }

    // Keep a concrete handle on the notifier so the delivered code can be read back
    let notifier = Arc::new(SimulatedWhatsAppNotifier::new(config.delivery_delay));
    let collaborators = WizardCollaborators {
        notifier: notifier.clone(),
        service: Arc::new(SimulatedSubscriptionService::new(&config)),
        codes: Arc::new(RandomCodeGenerator),
    };

    let mut wizard = match shell.open_notifications(collaborators, config) {
        WizardEntry::Ready(wizard) => wizard,
        WizardEntry::LoginRequired(prompt) => bail!(prompt.message()),
    };

    if args.no_browser {
        wizard.toggle_browser()?;
    }
    if args.whatsapp {
        wizard.toggle_whatsapp()?;
        wizard.set_phone_number(args.phone.clone().unwrap_or_default())?;
    }

    if let Step::AwaitingOtp { challenge_id } = wizard.submit().await? {
        let phone = wizard.phone_number().trim().to_string();
        let delivered = notifier
            .last_code_for(&phone)
            .context("Simulated notifier has no code for this number")?;
        println!("Code {} sent to {} (challenge {})", delivered, phone, challenge_id);

        if let Some(code) = &args.code {
            wizard.set_code_input(code)?;
            match wizard.verify().await {
                Ok(_) => {}
                Err(e @ WizardError::Validation(_)) | Err(e @ WizardError::Verification(_)) => {
                    println!("Code {} rejected: {}", code, e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        if wizard.result().is_none() {
            wizard.set_code_input(&delivered)?;
            wizard.verify().await?;
        }
    }

    let exit = wizard.close();
    if let WizardExit::Subscribed(result) = &exit {
        println!("{}", serde_json::to_string_pretty(result)?);
    }
    shell.apply_wizard_exit(exit);

    println!(
        "{}",
        serde_json::to_string_pretty(shell.notification_settings())?
    );
    Ok(())
}
