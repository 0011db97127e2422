use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use biblio_client::models::{
    BookFilters, BookUpdate, BorrowRequest, BorrowStatus, NewBook, RecordFilters,
};
use biblio_client::{FetchPolicy, FileCredentials, LibraryClient};

use crate::{BooksCommand, Command, RecordsCommand};

const CREDENTIALS_FILE: &str = "credentials.json";

/// Client commands log to stderr so stdout stays machine-readable.
pub fn init_client_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn parse_status(raw: &str) -> Result<BorrowStatus, String> {
    raw.parse()
        .map_err(|_| format!("unknown status '{raw}'; expected borrowed or returned"))
}

fn default_credentials_path() -> anyhow::Result<PathBuf> {
    directories::ProjectDirs::from("org", "biblio", "biblio")
        .map(|dirs| dirs.config_dir().join(CREDENTIALS_FILE))
        .ok_or_else(|| anyhow!("no home directory; pass --credentials"))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub struct Context {
    client: LibraryClient,
}

impl Context {
    pub fn open(
        api_url: &str,
        credentials: Option<PathBuf>,
        timeout_secs: u64,
    ) -> anyhow::Result<Self> {
        let path = match credentials {
            Some(path) => path,
            None => default_credentials_path()?,
        };
        tracing::debug!(api_url, credentials = %path.display(), "client configured");

        let client = LibraryClient::connect(api_url, Duration::from_secs(timeout_secs))?
            .with_credentials(Arc::new(FileCredentials::new(path)));
        Ok(Self { client })
    }

    pub async fn dispatch(&self, command: Command) -> anyhow::Result<()> {
        let policy = FetchPolicy::default();
        match command {
            Command::Serve => crate::serve().await,
            Command::Login { username, password } => {
                let session = self.client.login(&username, &password).await?;
                print_json(&session)
            }
            Command::Logout => {
                self.client.logout().await?;
                println!("Logged out");
                Ok(())
            }
            Command::Whoami => {
                if self.client.credentials()?.is_none() {
                    bail!("Not logged in; run `biblio login` first");
                }
                print_json(&self.client.verify().await?)
            }
            Command::Books(books) => self.books(books, policy).await,
            Command::Borrow {
                book_id,
                name,
                email,
            } => {
                let record = self
                    .client
                    .borrow(&BorrowRequest {
                        book_id,
                        borrower_name: name,
                        borrower_email: email,
                    })
                    .await?;
                print_json(&record)
            }
            Command::Return { record_id } => print_json(&self.client.return_book(record_id).await?),
            Command::Records(RecordsCommand::List(args)) => {
                let filters = RecordFilters {
                    page: args.page,
                    per_page: args.per_page,
                    status: args.status,
                    borrower_name: args.borrower_name,
                    borrower_email: args.borrower_email,
                    book_id: args.book_id,
                    sort_by: args.sort_by,
                    sort_order: args.sort_order,
                };
                print_json(&self.client.list_records(&filters, policy).await?)
            }
            Command::Records(RecordsCommand::Show { id }) => {
                print_json(&self.client.get_record(id, policy).await?)
            }
            Command::Stats => print_json(&self.client.statistics(policy).await?),
        }
    }

    async fn books(&self, command: BooksCommand, policy: FetchPolicy) -> anyhow::Result<()> {
        match command {
            BooksCommand::List(args) => {
                let filters = BookFilters {
                    page: args.page,
                    per_page: args.per_page,
                    title: args.title,
                    author: args.author,
                    isbn: args.isbn,
                    available_only: args.available_only,
                    sort_by: args.sort_by,
                    sort_order: args.sort_order,
                };
                print_json(&self.client.list_books(&filters, policy).await?)
            }
            BooksCommand::Show { id } => print_json(&self.client.get_book(id, policy).await?),
            BooksCommand::Add {
                title,
                author,
                isbn,
                quantity,
            } => {
                let book = NewBook {
                    title,
                    author,
                    isbn,
                    quantity,
                };
                print_json(&self.client.create_book(&book).await?)
            }
            BooksCommand::Update {
                id,
                title,
                author,
                isbn,
                quantity,
            } => {
                let update = BookUpdate {
                    title,
                    author,
                    isbn,
                    quantity,
                };
                print_json(&self.client.update_book(id, &update).await?)
            }
            BooksCommand::Remove { id } => print_json(&self.client.delete_book(id).await?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_parse_for_the_command_line() {
        assert_eq!(parse_status("Borrowed"), Ok(BorrowStatus::Borrowed));
        assert!(parse_status("lost").unwrap_err().contains("borrowed or returned"));
    }
}
