//! `biblio`: run the catalog server or talk to one.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use biblio_client::models::{BookId, RecordId};

/// Library catalog service and client.
#[derive(Parser)]
#[command(name = "biblio", version, about = "Library catalog service and client")]
struct Cli {
    /// API root of a running server.
    #[arg(
        long,
        global = true,
        env = "BIBLIO_API_URL",
        default_value = "http://localhost:8080/api"
    )]
    api_url: String,

    /// Where the login token is kept. Defaults to the user config dir.
    #[arg(long, global = true, env = "BIBLIO_CREDENTIALS")]
    credentials: Option<PathBuf>,

    /// Request timeout in seconds.
    #[arg(long, global = true, default_value_t = 15)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server with the layered settings.
    Serve,

    /// Obtain a token and remember it.
    Login {
        #[arg(long, short)]
        username: String,
        #[arg(long, short, env = "BIBLIO_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Forget the stored token.
    Logout,

    /// Show who the stored token belongs to.
    Whoami,

    /// Catalog titles.
    #[command(subcommand)]
    Books(BooksCommand),

    /// Lend one copy of a book.
    Borrow {
        book_id: BookId,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
    },

    /// Close a loan.
    Return { record_id: RecordId },

    /// Borrow records.
    #[command(subcommand)]
    Records(RecordsCommand),

    /// Catalog and lending totals.
    Stats,
}

#[derive(Subcommand)]
enum BooksCommand {
    List(BookListArgs),
    Show {
        id: BookId,
    },
    Add {
        #[arg(long)]
        title: String,
        #[arg(long)]
        author: String,
        #[arg(long)]
        isbn: String,
        #[arg(long, default_value_t = 1)]
        quantity: u32,
    },
    Update {
        id: BookId,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        author: Option<String>,
        #[arg(long)]
        isbn: Option<String>,
        #[arg(long)]
        quantity: Option<u32>,
    },
    Remove {
        id: BookId,
    },
}

#[derive(Args)]
struct BookListArgs {
    #[arg(long)]
    page: Option<u32>,
    #[arg(long)]
    per_page: Option<u32>,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    author: Option<String>,
    #[arg(long)]
    isbn: Option<String>,
    /// Only titles with a copy on the shelf.
    #[arg(long)]
    available_only: bool,
    #[arg(long)]
    sort_by: Option<String>,
    #[arg(long)]
    sort_order: Option<String>,
}

#[derive(Subcommand)]
enum RecordsCommand {
    List(RecordListArgs),
    Show { id: RecordId },
}

#[derive(Args)]
struct RecordListArgs {
    #[arg(long)]
    page: Option<u32>,
    #[arg(long)]
    per_page: Option<u32>,
    /// `borrowed` or `returned`.
    #[arg(long, value_parser = commands::parse_status)]
    status: Option<biblio_client::models::BorrowStatus>,
    #[arg(long)]
    borrower_name: Option<String>,
    #[arg(long)]
    borrower_email: Option<String>,
    #[arg(long)]
    book_id: Option<BookId>,
    #[arg(long)]
    sort_by: Option<String>,
    #[arg(long)]
    sort_order: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let outcome = match cli.command {
        Command::Serve => serve().await,
        command => {
            commands::init_client_logging();
            match commands::Context::open(&cli.api_url, cli.credentials, cli.timeout_secs) {
                Ok(ctx) => ctx.dispatch(command).await,
                Err(err) => Err(err),
            }
        }
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn serve() -> anyhow::Result<()> {
    let settings =
        biblio_kernel::Settings::load().with_context(|| "failed to load biblio settings")?;
    biblio_telemetry::init(&settings.telemetry);
    biblio_app::run(settings).await
}
