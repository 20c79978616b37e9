//! Command handlers.
//!
//! Protected commands go through [`App::require_session`] first, which
//! records the destination and runs the session guard. An unauthenticated
//! result ends the command with a sign-in message instead of an API call.

use std::io::{self, Write};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use tracing::{info, warn};

use expensa_core::auth::{CredentialStore, FileStore, SessionGuard, SessionStatus, SessionStore};
use expensa_core::models::{
    totals_by_category, CategoriesInput, CreateExpenseInput, Expense, ExpensesInput,
    RegisterRequest, UpdateExpenseInput,
};
use expensa_core::utils::{format_amount, format_remaining, truncate_string};
use expensa_core::{ApiClient, Config};

use crate::cli::Commands;

/// Days of history shown when no start date is given
const DEFAULT_LOOKBACK_DAYS: i64 = 30;

const SESSION_EXPIRED_MESSAGE: &str = "Session expired. Please log in again.";

/// Whether the command ran or was turned away for lack of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    SignInRequired,
}

impl Outcome {
    /// Process exit status for this outcome
    pub fn exit_status(self) -> u8 {
        match self {
            Outcome::Done => 0,
            Outcome::SignInRequired => 1,
        }
    }
}

pub struct App<S = FileStore> {
    config: Config,
    api: ApiClient,
    guard: SessionGuard<S, ApiClient>,
}

impl App<FileStore> {
    /// App backed by the session file from the config
    pub fn new(config: Config, api_url: Option<String>) -> Result<Self> {
        let endpoint = api_url.unwrap_or_else(|| config.api_url());
        let api = ApiClient::new(endpoint)?;
        let store = config.open_session_store()?;
        Ok(Self::with_store(config, api, store))
    }
}

impl<S: SessionStore> App<S> {
    pub fn with_store(config: Config, api: ApiClient, store: S) -> Self {
        let guard = SessionGuard::new(store, api.clone())
            .with_default_destination(config.default_destination());
        Self { config, api, guard }
    }

    pub async fn run(&mut self, command: Commands) -> Result<Outcome> {
        if let Some(destination) = command.destination() {
            self.guard.record_destination(destination)?;
        }

        match command {
            Commands::Login { email } => self.login(email).await,
            Commands::Register { user_name, email } => self.register(user_name, email).await,
            Commands::Logout { forget_device } => self.logout(forget_device),
            Commands::Status => self.status().await,
            Commands::Open { destination } => self.open(&destination).await,
            Commands::Expenses { from, to, take, skip } => self.expenses(from, to, take, skip).await,
            Commands::Report { from, to } => self.report(from, to).await,
            Commands::Categories => self.categories().await,
            Commands::Add { title, amount, category, date, notes } => {
                self.add(title, amount, category, date, notes).await
            }
            Commands::Update { id, title, amount, category, date, notes } => {
                self.update(id, title, amount, category, date, notes).await
            }
            Commands::Remove { id } => self.remove(&id).await,
        }
    }

    /// Run the guard and hand back an authenticated client and the user id
    async fn require_session(&self) -> Result<Option<(ApiClient, String)>> {
        if self.guard.check_session().await? == SessionStatus::Unauthenticated {
            return Ok(None);
        }

        let token = self
            .guard
            .access_token()?
            .ok_or_else(|| anyhow!("Session vanished after a successful check"))?;
        let user_id = self.guard.subject_id()?.unwrap_or_default();
        Ok(Some((self.api.with_token(token), user_id)))
    }

    fn sign_in_required() -> Result<Outcome> {
        eprintln!("{}", SESSION_EXPIRED_MESSAGE);
        Ok(Outcome::SignInRequired)
    }

    // ===== Account =====

    async fn login(&mut self, email: Option<String>) -> Result<Outcome> {
        let email = match email.or_else(|| self.config.last_email.clone()) {
            Some(email) => email,
            None => prompt("Email: ")?,
        };
        let password = rpassword::prompt_password("Password: ")?;

        println!("Authenticating...");
        let pair = self.api.login(&email, &password).await?;
        let claims = self.guard.begin_session(&pair)?;

        self.config.last_email = Some(email);
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }

        info!(subject = %claims.subject_id, "Login successful");
        println!("Login successful! Continue with '{}'.", self.guard.consume_destination()?);
        Ok(Outcome::Done)
    }

    async fn register(&self, user_name: String, email: String) -> Result<Outcome> {
        let password = rpassword::prompt_password("Password: ")?;
        let confirm_password = rpassword::prompt_password("Confirm password: ")?;

        let request = RegisterRequest {
            user_name,
            email,
            password,
            confirm_password,
        };
        let user = self.api.register(&request).await?;
        println!("Registered {} <{}>. You can now log in.", user.user_name, user.email);
        Ok(Outcome::Done)
    }

    fn logout(&self, forget_device: bool) -> Result<Outcome> {
        self.guard.end_session()?;
        if forget_device {
            CredentialStore::delete_store_secret()?;
        }
        println!("Logged out.");
        Ok(Outcome::Done)
    }

    async fn status(&self) -> Result<Outcome> {
        match self.guard.check_session().await? {
            SessionStatus::Valid => {
                let now = Utc::now();
                if let Some(claims) = self.guard.claims()? {
                    println!("Signed in as {}", claims.subject_id);
                    println!("Access token expires in {}", format_remaining(claims.expires_at, now));
                }
                println!("Next view: {}", self.guard.consume_destination()?);
                Ok(Outcome::Done)
            }
            SessionStatus::Unauthenticated => {
                println!("Not signed in.");
                Ok(Outcome::SignInRequired)
            }
        }
    }

    async fn open(&self, destination: &str) -> Result<Outcome> {
        self.guard.record_destination(destination)?;
        match self.guard.check_session().await? {
            SessionStatus::Valid => {
                println!("Opening {}", self.guard.consume_destination()?);
                Ok(Outcome::Done)
            }
            SessionStatus::Unauthenticated => Self::sign_in_required(),
        }
    }

    // ===== Expenses =====

    async fn expenses(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        take: u32,
        skip: u32,
    ) -> Result<Outcome> {
        let Some((api, user_id)) = self.require_session().await? else {
            return Self::sign_in_required();
        };

        let (start_date, end_date) = date_range(from, to);
        let input = ExpensesInput {
            user_id,
            start_date,
            end_date,
            take,
            skip,
        };

        let categories_input = CategoriesInput::default();
        let (expenses, categories) =
            futures::join!(api.expenses(&input), api.categories(&categories_input));
        let expenses = expenses?;

        print_expenses(&expenses);
        match categories {
            Ok(categories) => {
                let names: Vec<String> = categories
                    .iter()
                    .map(|c| format!("{} ({})", c.name, c.id))
                    .collect();
                println!("\nCategories: {}", names.join(", "));
            }
            Err(e) => warn!(error = %e, "Failed to fetch categories"),
        }
        Ok(Outcome::Done)
    }

    async fn report(&self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<Outcome> {
        let Some((api, user_id)) = self.require_session().await? else {
            return Self::sign_in_required();
        };

        let (start_date, end_date) = date_range(from, to);
        let input = ExpensesInput {
            user_id,
            start_date,
            end_date,
            take: expensa_core::models::DEFAULT_PAGE_SIZE,
            skip: 0,
        };
        let rows = api.expenses_report(&input).await?;

        println!("{:<24} {:>14}", "Category", "Total");
        let mut grand_total = 0.0;
        for (category, total) in totals_by_category(&rows) {
            grand_total += total;
            println!("{:<24} {:>14}", truncate_string(&category, 24), format_amount(total));
        }
        println!("{:<24} {:>14}", "All", format_amount(grand_total));
        Ok(Outcome::Done)
    }

    async fn categories(&self) -> Result<Outcome> {
        let Some((api, _)) = self.require_session().await? else {
            return Self::sign_in_required();
        };

        for category in api.categories(&CategoriesInput::default()).await? {
            println!("{:<12} {}", category.id, category.name);
        }
        Ok(Outcome::Done)
    }

    async fn add(
        &self,
        title: String,
        amount: f64,
        category_id: String,
        date: Option<NaiveDate>,
        notes: Option<String>,
    ) -> Result<Outcome> {
        let Some((api, user_id)) = self.require_session().await? else {
            return Self::sign_in_required();
        };

        let input = CreateExpenseInput {
            user_id,
            title,
            amount,
            date: date.map(start_of_day).unwrap_or_else(Utc::now),
            category_id,
            notes,
        };
        let expense = api.create_expense(&input).await?;
        println!("Created expense {} ({})", expense.id, format_amount(expense.amount));
        Ok(Outcome::Done)
    }

    async fn update(
        &self,
        id: String,
        title: String,
        amount: f64,
        category_id: String,
        date: Option<NaiveDate>,
        notes: Option<String>,
    ) -> Result<Outcome> {
        let Some((api, _)) = self.require_session().await? else {
            return Self::sign_in_required();
        };

        let input = UpdateExpenseInput {
            id,
            title,
            amount,
            date: date.map(start_of_day).unwrap_or_else(Utc::now),
            category_id,
            notes,
        };
        let expense = api.update_expense(&input).await?;
        println!("Updated expense {}", expense.id);
        Ok(Outcome::Done)
    }

    async fn remove(&self, id: &str) -> Result<Outcome> {
        let Some((api, _)) = self.require_session().await? else {
            return Self::sign_in_required();
        };

        let expense = api.remove_expense(id).await?;
        println!("Removed expense {} ({})", expense.id, expense.title);
        Ok(Outcome::Done)
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    start_of_day(date) + Duration::days(1) - Duration::seconds(1)
}

/// Inclusive range covering whole days; defaults to the last 30 days
fn date_range(from: Option<NaiveDate>, to: Option<NaiveDate>) -> (DateTime<Utc>, DateTime<Utc>) {
    let now = Utc::now();
    let start = from
        .map(start_of_day)
        .unwrap_or_else(|| now - Duration::days(DEFAULT_LOOKBACK_DAYS));
    let end = to.map(end_of_day).unwrap_or(now);
    (start, end)
}

fn print_expenses(expenses: &[Expense]) {
    if expenses.is_empty() {
        println!("No expenses in this range.");
        return;
    }

    println!(
        "{:<10} {:<24} {:>12} {:<14} {:<14} {}",
        "Id", "Title", "Amount", "Date", "Category", "Notes"
    );
    for e in expenses {
        println!(
            "{:<10} {:<24} {:>12} {:<14} {:<14} {}",
            truncate_string(&e.id, 10),
            truncate_string(&e.title, 24),
            format_amount(e.amount),
            e.date_display(),
            truncate_string(e.category_name(), 14),
            e.notes_display(),
        );
    }

    let total: f64 = expenses.iter().map(|e| e.amount).sum();
    println!("{:<35} {:>12}", "Total", format_amount(total));
}
