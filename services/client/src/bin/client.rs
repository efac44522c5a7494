//! services/client/src/bin/client.rs

use client_lib::{
    adapters::{ApiClient, FileTokenStore, ReqwestTransport},
    app::{
        chat::{AskOutcome, ChatSession, SkipReason},
        dashboard::{Dashboard, DashboardOptions},
        upload::prepare_upload,
    },
    auth::{AuthenticatedClient, SessionGuard, SessionService},
    config::Config,
    error::ClientError,
};
use docqa_core::{
    domain::{DocumentId, Role},
    ports::{HttpTransport, PortError, TokenStore},
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const HELP: &str = "\
Commands:
  login <username> <password>
  register <username> <email> <password>
  logout
  docs                      list documents
  upload <path> [title]     upload a PDF
  analyze <id>              start processing a document
  delete <id>
  open <id>                 chat about one document
  close                     close the open document
  ask <question>            ask the open document
  gask <question>           ask across all documents
  help
  quit";

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    info!("Configuration loaded. Talking to {}", config.api_base_url);

    // --- 2. Initialize Adapters ---
    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(
        config.api_base_url.clone(),
        config.request_timeout,
    )?);
    let store: Arc<dyn TokenStore> = Arc::new(FileTokenStore::open(&config.token_store_path)?);
    info!("Credentials stored at {}", config.token_store_path.display());

    // --- 3. Wire the Session and API Client ---
    let guard = Arc::new(SessionGuard::new(store.clone()));
    let sessions = SessionService::new(transport.clone(), store.clone(), guard.clone());
    let api = Arc::new(ApiClient::new(AuthenticatedClient::new(
        transport,
        store,
        guard.clone(),
    )));

    let mut shell = Shell {
        sessions,
        api,
        guard,
        options: DashboardOptions::from(&config),
        dashboard: None,
    };
    shell.mount();

    // --- 4. Run the Command Loop ---
    println!("Type 'help' for a list of commands.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt();
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = shell.session_ended() => {
                println!("\nYour session has expired. Please log in again.");
                shell.unmount().await;
                continue;
            }
        };
        let Some(line) = line else { break };

        let (command, rest) = split_command(&line);
        match command {
            "" => {}
            "quit" | "exit" => break,
            "help" => println!("{}", HELP),
            _ => shell.run(command, rest).await,
        }
        shell.show_notices();
    }

    shell.unmount().await;
    info!("Client exiting.");
    Ok(())
}

struct Shell {
    sessions: SessionService,
    api: Arc<ApiClient>,
    guard: Arc<SessionGuard>,
    options: DashboardOptions,
    dashboard: Option<Dashboard>,
}

impl Shell {
    fn mount(&mut self) {
        match Dashboard::mount(self.api.clone(), self.api.clone(), self.guard.clone(), self.options) {
            Ok(dashboard) => {
                println!("Logged in. Loading documents...");
                self.dashboard = Some(dashboard);
            }
            Err(_) => println!("Not logged in. Use 'login' or 'register'."),
        }
    }

    async fn unmount(&mut self) {
        if let Some(mut dashboard) = self.dashboard.take() {
            dashboard.teardown().await;
        }
    }

    async fn session_ended(&self) {
        match &self.dashboard {
            Some(dashboard) => dashboard.session_ended().await,
            None => std::future::pending().await,
        }
    }

    fn show_notices(&mut self) {
        if let Some(dashboard) = self.dashboard.as_mut() {
            for notice in dashboard.notices() {
                println!("! {}", notice.message);
            }
            dashboard.dismiss_notices();
        }
    }

    async fn run(&mut self, command: &str, rest: &str) {
        let args: Vec<&str> = rest.split_whitespace().collect();
        match (command, args.as_slice()) {
            ("login", [username, password]) => self.login(username, password).await,
            ("register", [username, email, password]) => {
                match self.sessions.register(username, email, password).await {
                    Ok(user) => println!("Account '{}' created. You can log in now.", user.username),
                    Err(e) => println!("Registration failed: {}", e),
                }
            }
            ("logout", []) => {
                self.unmount().await;
                if let Err(e) = self.sessions.logout() {
                    warn!("Logout could not clear stored credentials: {}", e);
                }
                println!("Logged out.");
            }
            ("ask", _) | ("gask", _) if rest.is_empty() => println!("Please enter a question."),
            ("gask", _) => {
                let chat = match &self.dashboard {
                    Some(dashboard) => dashboard.global_chat(),
                    None => return println!("Log in first."),
                };
                ask(&chat, rest).await;
            }
            ("ask", _) => {
                let chat = match self.dashboard.as_ref().and_then(Dashboard::active_chat) {
                    Some(chat) => chat,
                    None => return println!("Open a document first ('open <id>')."),
                };
                ask(&chat, rest).await;
            }
            _ => match self.dashboard.as_mut() {
                Some(dashboard) => documents_command(dashboard, command, rest, &args).await,
                None => println!("Log in first, or type 'help'."),
            },
        }
    }

    async fn login(&mut self, username: &str, password: &str) {
        self.unmount().await;
        match self.sessions.login(username, password).await {
            Ok(()) => self.mount(),
            Err(e) => println!("Login failed: {}", e),
        }
    }
}

async fn documents_command(dashboard: &mut Dashboard, command: &str, rest: &str, args: &[&str]) {
    match (command, args) {
        ("docs", []) => print_documents(dashboard),
        ("upload", [path, ..]) => {
            let title = rest[path.len()..].trim();
            let title = (!title.is_empty()).then_some(title);
            let upload = match prepare_upload(&[PathBuf::from(*path)], title).await {
                Ok(upload) => upload,
                Err(ClientError::Port(e)) => return dashboard.report(&e),
                Err(e) => return println!("Could not read {}: {}", path, e),
            };
            if let Ok(document) = dashboard.upload(upload).await {
                println!("Uploaded '{}' as document {} ({}).", document.title, document.id, status_label(&document.status));
            }
        }
        ("analyze", [id]) => {
            if dashboard.analyze(&DocumentId::from(*id)).await.is_ok() {
                println!("Analysis started for document {}.", id);
            }
        }
        ("delete", [id]) => {
            if dashboard.delete(&DocumentId::from(*id)).await.is_ok() {
                println!("Deleted document {}.", id);
            }
        }
        ("open", [id]) => {
            if let Ok(chat) = dashboard.open_document(&DocumentId::from(*id)) {
                println!("Opened document {}. Use 'ask <question>'.", id);
                print_log(&chat);
            }
        }
        ("close", []) => dashboard.close_document(),
        _ => println!("Unknown command or wrong arguments. Type 'help'."),
    }
}

async fn ask(chat: &ChatSession, question: &str) {
    match chat.ask(question).await {
        AskOutcome::Answered | AskOutcome::Failed(_) => {
            if let Some(reply) = chat.messages().last() {
                print_message(reply);
            }
        }
        AskOutcome::Cancelled => println!("Question cancelled."),
        AskOutcome::Skipped(SkipReason::NotReady(reason)) => println!("{}", reason),
        AskOutcome::Skipped(SkipReason::Busy) => println!("Still waiting for the previous answer."),
        AskOutcome::Skipped(SkipReason::Closed) => println!("This conversation was closed."),
        AskOutcome::Skipped(SkipReason::EmptyQuestion) => println!("Please enter a question."),
    }
}

fn print_documents(dashboard: &Dashboard) {
    let collection = dashboard.collection();
    if let Some(e) = &collection.last_error {
        if !matches!(e, PortError::SessionExpired) {
            println!("(last refresh failed: {})", e);
        }
    }
    if collection.documents.is_empty() {
        println!("No documents yet. Use 'upload <path>'.");
        return;
    }
    for document in &collection.documents {
        let size = document
            .file_size
            .map(|bytes| format!(", {} KiB", bytes / 1024))
            .unwrap_or_default();
        println!(
            "{:>6}  {:<11} {} ({}{})",
            document.id.as_str(),
            status_label(&document.status),
            document.title,
            document.created_at.format("%Y-%m-%d %H:%M"),
            size
        );
    }
}

fn print_log(chat: &ChatSession) {
    for message in chat.messages() {
        print_message(&message);
    }
}

fn print_message(message: &docqa_core::domain::Message) {
    let speaker = match message.role {
        Role::User => "you",
        Role::Assistant => "assistant",
    };
    println!("[{}] {}: {}", message.timestamp.format("%H:%M:%S"), speaker, message.content);
    for source in &message.sources {
        let title = source.document_title.as_deref().unwrap_or("source");
        match source.page {
            Some(page) => println!("    - {} (p. {})", title, page),
            None => println!("    - {}", title),
        }
    }
}

fn status_label(status: &docqa_core::domain::DocumentStatus) -> String {
    format!("{:?}", status).to_lowercase()
}

fn split_command(line: &str) -> (&str, &str) {
    let line = line.trim();
    match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    }
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}
