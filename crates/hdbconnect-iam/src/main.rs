use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use hdbconnect_iam::config::{self, Config, redacted_url};
use hdbconnect_iam::create_pool;
use hdbconnect_iam::observability::{init_observability, shutdown_observability};
use hdbconnect_iam::password::{Algorithm, PasswordPolicy, hash_password};
use hdbconnect_iam::realm::{Authenticator, RealmsConfig, load_realms};
use hdbconnect_iam::store::{HanaUserStore, UserStore};
use hdbconnect_iam::{HanaTenantBackend, IsolationMode, TenantConfig, TenantManager};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(name = "hdbconnect-iam")]
#[command(about = "Identity and tenancy administration for SAP HANA", long_about = None)]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable JSON logging output
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Hash a password for use in realms.toml
    HashPassword {
        /// Password to hash; read from stdin when omitted
        password: Option<String>,

        /// PBKDF2 variant (pbkdf2-sha256, pbkdf2-sha384, pbkdf2-sha512)
        #[arg(long)]
        algorithm: Option<Algorithm>,

        /// Iteration count
        #[arg(long)]
        iterations: Option<u32>,
    },

    /// Load and validate realms.toml
    CheckRealms {
        /// Directory containing realms.toml
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Create the durable users table and index
    Migrate,

    /// Provision storage for a tenant under the configured isolation mode
    ProvisionTenant {
        /// Tenant ID
        id: String,

        /// Display name; defaults to the ID
        #[arg(long)]
        name: Option<String>,

        /// Realm the tenant authenticates against
        #[arg(long)]
        realm: Option<String>,

        /// Schema name override
        #[arg(long)]
        schema: Option<String>,
    },

    /// Try a login against a file realm
    Authenticate {
        /// Directory containing realms.toml
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Realm name
        #[arg(long)]
        realm: String,

        #[arg(long)]
        username: String,

        /// Password; read from stdin when omitted
        #[arg(long, env = "IAM_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration with precedence: env > file > defaults
    let mut builder = if let Some(ref path) = args.config {
        config::load_config_from_path(path)?
    } else {
        config::load_config()?
    };

    if args.verbose {
        builder = builder.log_level("debug".to_string());
    }
    if args.json_logs {
        builder = builder.json_logs(true);
    }

    let config = builder.build()?;
    init_observability(&config.telemetry)?;

    let result = run(args.command, &config).await;

    shutdown_observability();
    result
}

async fn run(command: Command, config: &Config) -> anyhow::Result<()> {
    match command {
        Command::HashPassword {
            password,
            algorithm,
            iterations,
        } => {
            let password = password_or_stdin(password).await?;
            let mut policy = PasswordPolicy::default();
            if let Some(algorithm) = algorithm {
                policy.algorithm = algorithm.as_str().to_string();
            }
            if let Some(iterations) = iterations {
                policy = policy.with_iterations(iterations);
            }
            policy.validate()?;

            let encoded =
                tokio::task::spawn_blocking(move || hash_password(&password, &policy)).await??;
            println!("{encoded}");
        }

        Command::CheckRealms { dir } => {
            let dir = dir.unwrap_or_else(|| config.realms_dir().to_path_buf());
            let realms = load_realms(&dir)?;
            print_realm_summary(&dir, &realms);
        }

        Command::Migrate => {
            let url = config.require_connection_url()?;
            tracing::info!(url = %redacted_url(url), "Provisioning users table");

            let pool = create_pool(url.to_string(), config.pool_size.get())?;
            HanaUserStore::new(pool).migrate().await?;
            println!("users table ready");
        }

        Command::ProvisionTenant {
            id,
            name,
            realm,
            schema,
        } => {
            let url = config.require_connection_url()?;
            let pool = create_pool(url.to_string(), config.pool_size.get())?;
            let backend = HanaTenantBackend::from_config(pool, &config.tenancy);
            let shared_schema = backend.shared_schema().map(str::to_string);
            let manager =
                TenantManager::new(std::sync::Arc::new(backend), config.tenancy.manager_config());

            let mut tenant = TenantConfig::new(id.clone(), name.unwrap_or(id));
            if let Some(realm) = realm {
                tenant = tenant.with_realm(realm);
            }
            if let Some(schema) = schema {
                tenant = tenant.with_schema_name(schema);
            }

            let tenant = manager.register_tenant(tenant).await?;
            println!("tenant: {}", tenant.id);
            println!("isolation: {}", tenant.isolation());
            match tenant.isolation() {
                IsolationMode::Schema => {
                    println!("schema: {}", tenant.schema_name.as_deref().unwrap_or_default());
                }
                IsolationMode::Row => println!(
                    "shared schema: {}",
                    shared_schema.as_deref().unwrap_or("connection default")
                ),
            }
        }

        Command::Authenticate {
            dir,
            realm,
            username,
            password,
        } => {
            let dir = dir.unwrap_or_else(|| config.realms_dir().to_path_buf());
            let authenticator = Authenticator::from_dir(&dir)?;
            let password = password_or_stdin(password).await?;

            let result = tokio::task::spawn_blocking(move || {
                authenticator.authenticate_by_realm_name(&realm, &username, &password)
            })
            .await?;

            println!("authenticated: {}", result.authenticated);
            println!("code: {}", result.error_code);
            if let Some(error) = &result.error {
                println!("error: {error}");
            }
            if result.authenticated {
                println!("user_id: {}", result.user_id);
                println!("roles: {}", result.roles.join(", "));
                println!("permissions: {}", result.permissions.join(", "));
            }
        }
    }

    Ok(())
}

async fn password_or_stdin(password: Option<String>) -> anyhow::Result<String> {
    if let Some(password) = password {
        return Ok(password);
    }

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        anyhow::bail!("no password given");
    }
    Ok(password)
}

fn print_realm_summary(dir: &Path, realms: &RealmsConfig) {
    println!(
        "{}: {} realm(s), {} user(s)",
        dir.join(hdbconnect_iam::realm::REALMS_FILE).display(),
        realms.realms.len(),
        realms.user_count()
    );
    for realm in &realms.realms {
        println!(
            "  {} [{}] type={} enabled={} users={} roles={}",
            realm.name,
            realm.id,
            realm.realm_type,
            realm.enabled,
            realm.users.len(),
            realm.roles.len()
        );
    }
}
