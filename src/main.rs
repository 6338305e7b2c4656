use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tokio::sync::broadcast;

use hr_console::authz::{has_module_permission, has_permission, permissions, PermissionCatalogue};
use hr_console::db::SqliteSessionStore;
use hr_console::events::{self, Actor, AppEvent, DomainEvent};
use hr_console::models::candidate::{Candidate, CandidateStatus};
use hr_console::models::department::Department;
use hr_console::models::employee::Employee;
use hr_console::models::rbac::{RoleDraft, RoleUpdate};
use hr_console::notify::{self, AutoConfirm, Confirm, Level, Notification, Notifier, TerminalConfirm};
use hr_console::sync::{DateRange, SortOrder, SyncEntity, ViewFilter};
use hr_console::{AppError, ClientConfig, EntityStore, HttpBackend, Identity, ListQuery, RoleService, SessionManager};

#[derive(Parser, Debug)]
#[command(author, version, about = "HR dashboard console client", long_about = None)]
struct Cli {
    /// Answer yes to every confirmation prompt
    #[arg(long, global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Authenticate and persist the session
    Login {
        email: String,
        #[arg(long)]
        password: String,
    },
    Logout,
    /// Show the current identity
    Whoami,
    /// Check a single permission flag, e.g. CANDIDATE_VIEW
    Can { flag: String },
    /// Check an action on any sub-module of a module
    CanModule { module: String, action: String },
    /// List every known permission flag
    Flags,
    #[command(subcommand)]
    Roles(RolesCommand),
    #[command(subcommand)]
    Candidates(CandidatesCommand),
    /// List employees
    Employees(ListArgs),
    /// List departments
    Departments(ListArgs),
}

#[derive(Subcommand, Debug)]
enum RolesCommand {
    List,
    Create {
        name: String,
        #[arg(long)]
        description: Option<String>,
        /// Permission flags, comma separated
        #[arg(long = "permission", value_delimiter = ',')]
        permissions: Vec<String>,
    },
    Update {
        /// Role id or name
        role: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Replace the permission set (comma separated flags)
        #[arg(long = "permission", value_delimiter = ',')]
        permissions: Option<Vec<String>>,
    },
    Delete {
        /// Role id or name
        role: String,
    },
    Assign { user_id: String, role: String },
    Unassign { user_id: String, role: String },
}

#[derive(Subcommand, Debug)]
enum CandidatesCommand {
    List(ListArgs),
    /// Move a candidate to another status
    Status { id: String, status: String },
    Delete { id: String },
}

#[derive(Args, Debug, Clone)]
struct ListArgs {
    #[arg(long)]
    search: Option<String>,
    #[arg(long)]
    status: Option<String>,
    #[arg(long)]
    department: Option<String>,
    /// all, today, 7d or 30d
    #[arg(long, default_value = "all")]
    since: String,
    /// newest, oldest or name
    #[arg(long, default_value = "newest")]
    sort: String,
    #[arg(long, default_value_t = 1)]
    page: usize,
    #[arg(long, default_value_t = 20)]
    per_page: usize,
}

impl ListArgs {
    fn filter(&self) -> anyhow::Result<ViewFilter> {
        let date_range = DateRange::parse(&self.since).with_context(|| format!("unknown date range `{}`", self.since))?;
        let sort = match self.sort.trim().to_ascii_lowercase().as_str() {
            "newest" => SortOrder::Newest,
            "oldest" => SortOrder::Oldest,
            "name" => SortOrder::Name,
            other => anyhow::bail!("unknown sort order `{other}`"),
        };

        let mut filter = ViewFilter::default().with_date_range(date_range).with_sort(sort);
        if let Some(search) = &self.search {
            filter = filter.with_search(search.clone());
        }
        if let Some(status) = &self.status {
            filter = filter.with_status(status.clone());
        }
        if let Some(department) = &self.department {
            filter = filter.with_department(department.clone());
        }
        Ok(filter)
    }

    /// Server-side narrowing mirrors the status/department filters.
    fn query(&self) -> ListQuery {
        let mut query = ListQuery::default();
        if let Some(status) = self.status.as_deref().filter(|status| !status.eq_ignore_ascii_case("all")) {
            query = query.with_status(status);
        }
        if let Some(department) = self.department.as_deref().filter(|dep| !dep.eq_ignore_ascii_case("all")) {
            query = query.with_department(department);
        }
        query
    }
}

/// Shared collaborators for one invocation.
struct Console {
    backend: Arc<HttpBackend>,
    session: SessionManager<SqliteSessionStore>,
    bus: events::EventBus,
    bus_rx: broadcast::Receiver<DomainEvent<AppEvent>>,
    notifier: Notifier,
    confirm: Arc<dyn Confirm>,
}

impl Console {
    async fn open(config: &ClientConfig, assume_yes: bool) -> anyhow::Result<(Self, broadcast::Receiver<Notification>)> {
        let backend = Arc::new(HttpBackend::new(config)?);
        let store = SqliteSessionStore::connect(&config.session_database_url)
            .await
            .context("failed to open session store")?;

        let mut session = SessionManager::new(store);
        session.restore().await?;
        backend.set_token(session.token().map(str::to_string)).await;

        let (bus, bus_rx) = events::init_event_bus();
        let (notifier, notifications) = Notifier::channel();
        let confirm: Arc<dyn Confirm> = if assume_yes {
            Arc::new(AutoConfirm(true))
        } else {
            Arc::new(TerminalConfirm)
        };

        Ok((
            Self {
                backend,
                session,
                bus,
                bus_rx,
                notifier,
                confirm,
            },
            notifications,
        ))
    }

    fn identity(&self) -> anyhow::Result<&Identity> {
        self.session
            .identity()
            .ok_or_else(|| AppError::unauthorized("Not logged in, run `hr-console login` first").into())
    }

    fn require(&self, flag: &str) -> anyhow::Result<&Identity> {
        let identity = self.identity()?;
        if !has_permission(Some(identity), flag) {
            anyhow::bail!("permission denied: {flag} is required");
        }
        Ok(identity)
    }

    fn actor(&self) -> Actor {
        self.session
            .identity()
            .map(|identity| Actor::new(identity.id.clone(), identity.display_name()))
            .unwrap_or_else(Actor::system)
    }

    fn roles(&self) -> RoleService {
        let service = RoleService::new(
            self.backend.clone(),
            self.bus.clone(),
            self.notifier.clone(),
            self.confirm.clone(),
        );
        match self.session.identity() {
            Some(identity) => service.with_actor(identity.id.clone()),
            None => service,
        }
    }

    fn store<E: SyncEntity>(&self) -> EntityStore<E> {
        EntityStore::<E>::new(
            self.backend.clone(),
            self.bus.clone(),
            self.notifier.clone(),
            self.confirm.clone(),
            self.actor(),
        )
    }

    /// Apply broadcasts that concern the current session.
    async fn settle(&mut self) -> anyhow::Result<()> {
        while let Ok(event) = self.bus_rx.try_recv() {
            tracing::debug!(event = %event.name, "handling broadcast");
            self.session.handle_event(&event).await?;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_env();
    init_tracing();

    let cli = Cli::parse();
    let config = ClientConfig::from_env()?;
    let (mut console, mut notifications) = Console::open(&config, cli.yes).await?;

    let result = run(&mut console, cli.command).await;
    print_notifications(&mut notifications);
    result
}

async fn run(console: &mut Console, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Login { email, password } => {
            let backend = console.backend.clone();
            let identity = console.session.login(&*backend, &email, &password).await?;
            println!("Logged in as {} ({})", identity.display_name(), identity.role);
        }
        Commands::Logout => {
            let backend = console.backend.clone();
            console.session.logout(&*backend).await?;
            println!("Logged out");
        }
        Commands::Whoami => {
            let identity = console.identity()?;
            println!("{} <{}>", identity.display_name(), identity.email);
            println!("role: {}", identity.role);
            let granted = hr_console::authz::flags_from_tree(&identity.permissions);
            println!("permissions: {}", granted.into_iter().collect::<Vec<_>>().join(", "));
        }
        Commands::Can { flag } => {
            let allowed = has_permission(console.session.identity(), &flag);
            println!("{flag}: {}", if allowed { "allowed" } else { "denied" });
        }
        Commands::CanModule { module, action } => {
            let allowed = has_module_permission(console.session.identity(), &module, &action);
            println!("{module}/{action}: {}", if allowed { "allowed" } else { "denied" });
        }
        Commands::Flags => {
            for flag in PermissionCatalogue::global().flags() {
                println!("{flag}");
            }
        }
        Commands::Roles(command) => run_roles(console, command).await?,
        Commands::Candidates(command) => run_candidates(console, command).await?,
        Commands::Employees(args) => {
            console.require(permissions::EMPLOYEE_VIEW)?;
            let mut store = console.store::<Employee>();
            list_records(&mut store, &args).await?;
        }
        Commands::Departments(args) => {
            console.require(permissions::DEPARTMENT_VIEW)?;
            let mut store = console.store::<Department>();
            list_records(&mut store, &args).await?;
        }
    }
    Ok(())
}

async fn run_roles(console: &mut Console, command: RolesCommand) -> anyhow::Result<()> {
    let mut roles = console.roles();

    match command {
        RolesCommand::List => {
            console.require(permissions::ROLE_VIEW)?;
            roles.try_refresh().await?;
            for role in roles.roles() {
                println!("{:<24} {:<24} {} flags", role.id, role.name, role.permissions.len());
            }
        }
        RolesCommand::Create {
            name,
            description,
            permissions: flags,
        } => {
            console.require(permissions::ROLE_CREATE)?;
            roles.refresh().await;
            roles
                .create_role(RoleDraft {
                    name,
                    description,
                    permissions: flags,
                })
                .await?;
        }
        RolesCommand::Update {
            role,
            name,
            description,
            permissions: flags,
        } => {
            console.require(permissions::ROLE_EDIT)?;
            roles.refresh().await;
            let role_id = roles.find(&role).map(|found| found.id.clone()).unwrap_or(role);
            roles
                .update_role(
                    &role_id,
                    RoleUpdate {
                        name,
                        description,
                        permissions: flags,
                    },
                )
                .await?;
        }
        RolesCommand::Delete { role } => {
            console.require(permissions::ROLE_DELETE)?;
            roles.refresh().await;
            roles.delete_role(&role).await?;
        }
        RolesCommand::Assign { user_id, role } => {
            console.require(permissions::USER_EDIT)?;
            roles.refresh().await;
            let role_id = roles.find(&role).map(|found| found.id.clone()).unwrap_or(role);
            roles.assign_role_to_user(&user_id, &role_id).await?;
        }
        RolesCommand::Unassign { user_id, role } => {
            console.require(permissions::USER_EDIT)?;
            roles.refresh().await;
            let role_id = roles.find(&role).map(|found| found.id.clone()).unwrap_or(role);
            roles.unassign_role_from_user(&user_id, &role_id).await?;
        }
    }

    console.settle().await
}

async fn run_candidates(console: &mut Console, command: CandidatesCommand) -> anyhow::Result<()> {
    let mut store = console.store::<Candidate>();

    match command {
        CandidatesCommand::List(args) => {
            console.require(permissions::CANDIDATE_VIEW)?;
            list_records(&mut store, &args).await?;
        }
        CandidatesCommand::Status { id, status } => {
            console.require(permissions::CANDIDATE_EDIT)?;
            store.refresh().await;
            let status = CandidateStatus::from(status);
            if store.change_status(&id, status).await? {
                if let Some(candidate) = store.find(&id) {
                    println!("{} is now {}", candidate.full_name(), candidate.status);
                }
            }
        }
        CandidatesCommand::Delete { id } => {
            console.require(permissions::CANDIDATE_DELETE)?;
            store.refresh().await;
            store.delete(&id).await?;
        }
    }
    Ok(())
}

async fn list_records<E: SyncEntity>(store: &mut EntityStore<E>, args: &ListArgs) -> anyhow::Result<()> {
    let filter = args.filter()?;
    store.set_query(args.query()).await;

    let page = store.page(&filter, Utc::now(), args.page, args.per_page);
    for record in &page.items {
        println!(
            "{:<24} {:<32} {:<12} {}",
            record.id(),
            record.display_name(),
            record.status().to_string(),
            record.department().unwrap_or("-")
        );
    }
    println!("page {}/{} ({} records)", page.page, page.pages.max(1), page.total);
    Ok(())
}

fn print_notifications(rx: &mut broadcast::Receiver<Notification>) {
    for notification in notify::drain(rx) {
        match notification.level {
            Level::Error => eprintln!("error: {}", notification.message),
            Level::Success => println!("{}", notification.message),
        }
    }
}

fn load_env() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    let _ = dotenvy::from_path(crate_env);
}

fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr);

    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
