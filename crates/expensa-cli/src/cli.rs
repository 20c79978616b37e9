use chrono::NaiveDate;
use clap::{Parser, Subcommand};

/// expensa - track expenses from the terminal
#[derive(Parser)]
#[command(name = "expensa", version, about)]
pub struct Cli {
    /// GraphQL endpoint of the expense server
    #[arg(long, global = true, env = "EXPENSA_API_URL")]
    pub api_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in and store the session
    Login {
        #[arg(long)]
        email: Option<String>,
    },

    /// Create an account
    Register {
        #[arg(long)]
        user_name: String,
        #[arg(long)]
        email: String,
    },

    /// Sign out and clear the stored session
    Logout {
        /// Also delete the keychain secret that seals the session file
        #[arg(long)]
        forget_device: bool,
    },

    /// Show whether the stored session is usable
    Status,

    /// Remember a view and check the session before going there
    Open { destination: String },

    /// List expenses in a date range
    Expenses {
        /// First day, YYYY-MM-DD (default: 30 days ago)
        #[arg(long, value_parser = parse_date)]
        from: Option<NaiveDate>,
        /// Last day, YYYY-MM-DD (default: today)
        #[arg(long, value_parser = parse_date)]
        to: Option<NaiveDate>,
        #[arg(long, default_value_t = 100)]
        take: u32,
        #[arg(long, default_value_t = 0)]
        skip: u32,
    },

    /// Summarize spending per category
    Report {
        #[arg(long, value_parser = parse_date)]
        from: Option<NaiveDate>,
        #[arg(long, value_parser = parse_date)]
        to: Option<NaiveDate>,
    },

    /// List expense categories
    Categories,

    /// Record a new expense
    Add {
        #[arg(long)]
        title: String,
        #[arg(long)]
        amount: f64,
        /// Category id
        #[arg(long)]
        category: String,
        /// Day of the expense, YYYY-MM-DD (default: now)
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Edit an existing expense
    Update {
        #[arg(long)]
        id: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        amount: f64,
        #[arg(long)]
        category: String,
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Delete an expense
    Remove {
        #[arg(long)]
        id: String,
    },
}

impl Commands {
    /// View a command belongs to, for protected commands
    pub fn destination(&self) -> Option<&'static str> {
        match self {
            Commands::Expenses { .. } | Commands::Add { .. } | Commands::Update { .. } | Commands::Remove { .. } => {
                Some("expense")
            }
            Commands::Report { .. } => Some("report"),
            Commands::Categories => Some("categories"),
            _ => None,
        }
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("expected YYYY-MM-DD: {}", e))
}
