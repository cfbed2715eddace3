use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use textback_gateway::db::{self, BusinessRepo, NewBusiness};
use textback_gateway::twilio::{OutgoingSms, SmsSender, TwilioClient};
use textback_gateway::{Config, api};

/// Textback - missed-call text-back gateway for small businesses
#[derive(Parser)]
#[command(name = "textback", version, about)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, env = "TEXTBACK_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database path override
    #[arg(long, env = "TEXTBACK_DB_PATH")]
    db: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the gateway server (the default when no subcommand is given)
    Serve,
    /// Create a business, or update the one holding the same phone number
    AddBusiness {
        /// Business display name
        #[arg(short, long)]
        name: String,
        /// Twilio phone number routed at this gateway
        #[arg(short, long)]
        phone: String,
        /// Owner's phone number for alerts
        #[arg(short, long)]
        owner: String,
        /// Missed-call text-back template ({business}, {caller})
        #[arg(long)]
        greeting: Option<String>,
        /// Fallback reply template for inbound texts
        #[arg(long)]
        reply: Option<String>,
        /// Online-ordering link
        #[arg(long)]
        ordering_url: Option<String>,
    },
    /// List all businesses
    ListBusinesses,
    /// Add an FAQ pair to a business
    AddFaq {
        /// Business id
        #[arg(short, long)]
        business: String,
        /// The question customers ask
        question: String,
        /// The answer to send back
        answer: String,
    },
    /// List a business's FAQ pairs
    ListFaqs {
        /// Business id
        #[arg(short, long)]
        business: String,
    },
    /// Send a test SMS through the configured Twilio account
    SendTest {
        /// Destination phone number
        #[arg(short, long)]
        to: String,
        /// Sending number (defaults to the first business's number)
        #[arg(short, long)]
        from: Option<String>,
        /// Message body
        #[arg(default_value = "Test message from textback-gateway.")]
        body: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info,textback_gateway=info",
            1 => "info,textback_gateway=debug",
            2 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(db_path) = cli.db {
        config.db_path = db_path;
    }

    match cli.command {
        None | Some(Command::Serve) => serve(config).await,
        Some(Command::AddBusiness {
            name,
            phone,
            owner,
            greeting,
            reply,
            ordering_url,
        }) => add_business(&config, name, phone, owner, greeting, reply, ordering_url),
        Some(Command::ListBusinesses) => list_businesses(&config),
        Some(Command::AddFaq {
            business,
            question,
            answer,
        }) => add_faq(&config, &business, &question, &answer),
        Some(Command::ListFaqs { business }) => list_faqs(&config, &business),
        Some(Command::SendTest { to, from, body }) => send_test(&config, to, from, body).await,
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    tracing::info!(
        db = %config.db_path.display(),
        port = config.server.port,
        "starting textback gateway"
    );

    let pool = db::init(&config.db_path)?;

    let mut builder = api::ApiServerBuilder::new(config.clone(), pool);

    match TwilioClient::from_config(&config.twilio) {
        Some(client) => builder = builder.sender(Arc::new(client)),
        None => tracing::warn!("Twilio credentials not configured, outbound SMS disabled"),
    }

    match textback_gateway::LlmClient::from_config(&config.llm) {
        Some(client) => builder = builder.llm(Arc::new(client)),
        None => tracing::info!("no LLM key configured, using template replies"),
    }

    builder.build().run().await?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn add_business(
    config: &Config,
    name: String,
    phone: String,
    owner: String,
    greeting: Option<String>,
    reply: Option<String>,
    ordering_url: Option<String>,
) -> anyhow::Result<()> {
    let pool = db::init(&config.db_path)?;
    let repo = BusinessRepo::new(pool);

    let business = repo.upsert(&NewBusiness {
        name,
        phone_number: phone,
        owner_phone: owner,
        greeting_template: greeting,
        reply_template: reply,
        ordering_url,
    })?;

    println!("{}  {}  {}", business.id, business.phone_number, business.name);
    Ok(())
}

fn list_businesses(config: &Config) -> anyhow::Result<()> {
    let pool = db::init(&config.db_path)?;
    let repo = BusinessRepo::new(pool);

    let businesses = repo.list_all()?;
    if businesses.is_empty() {
        println!("no businesses registered");
        return Ok(());
    }

    println!(
        "{:<36}  {:<14}  {:<10}  NAME",
        "ID", "PHONE", "STATUS"
    );
    for b in businesses {
        println!(
            "{:<36}  {:<14}  {:<10}  {}",
            b.id,
            b.phone_number,
            b.subscription_status.as_str(),
            b.name
        );
    }
    Ok(())
}

fn add_faq(config: &Config, business_id: &str, question: &str, answer: &str) -> anyhow::Result<()> {
    let pool = db::init(&config.db_path)?;
    let repo = BusinessRepo::new(pool);

    let faq = repo.add_faq(business_id, question, answer)?;
    println!("{}  [{}] {}", faq.id, faq.position, faq.question);
    Ok(())
}

fn list_faqs(config: &Config, business_id: &str) -> anyhow::Result<()> {
    let pool = db::init(&config.db_path)?;
    let repo = BusinessRepo::new(pool);

    let faqs = repo.faqs_for(business_id)?;
    if faqs.is_empty() {
        println!("no FAQs for business {business_id}");
        return Ok(());
    }
    for faq in faqs {
        println!("[{}] Q: {}", faq.position, faq.question);
        println!("    A: {}", faq.answer);
    }
    Ok(())
}

async fn send_test(
    config: &Config,
    to: String,
    from: Option<String>,
    body: String,
) -> anyhow::Result<()> {
    let client = TwilioClient::from_config(&config.twilio)
        .ok_or_else(|| anyhow::anyhow!("TWILIO_ACCOUNT_SID and TWILIO_AUTH_TOKEN are required"))?;

    let from = match from {
        Some(from) => from,
        None => {
            let pool = db::init(&config.db_path)?;
            let repo = BusinessRepo::new(pool);
            repo.list_all()?
                .first()
                .map(|b| b.phone_number.clone())
                .ok_or_else(|| anyhow::anyhow!("no businesses registered, pass --from"))?
        }
    };

    let sent = client.send(OutgoingSms { to, from, body }).await?;
    println!("sent {} ({})", sent.sid, sent.status.as_str());
    Ok(())
}
