use crate::store::firestore::DEFAULT_TOKEN_URI;
use anyhow::{anyhow, Result};
use clap::{builder::PossibleValuesParser, Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_STORE: &str = "store";
pub const ARG_COLLECTION: &str = "collection";
pub const ARG_IDENTIFIER_FIELD: &str = "identifier-field";
pub const ARG_STORE_TIMEOUT_SECONDS: &str = "store-timeout-seconds";
pub const ARG_STORE_RETRIES: &str = "store-retries";
pub const ARG_FIRESTORE_PROJECT_ID: &str = "firestore-project-id";
pub const ARG_FIRESTORE_CLIENT_EMAIL: &str = "firestore-client-email";
pub const ARG_FIRESTORE_PRIVATE_KEY: &str = "firestore-private-key";
pub const ARG_FIRESTORE_TOKEN_URI: &str = "firestore-token-uri";
pub const ARG_FIRESTORE_EMULATOR_HOST: &str = "firestore-emulator-host";
pub const ARG_DSN: &str = "dsn";

#[derive(Clone)]
pub enum Backend {
    Firestore {
        project_id: String,
        client_email: Option<String>,
        private_key: Option<SecretString>,
        token_uri: String,
        emulator_host: Option<String>,
    },
    Postgres {
        dsn: SecretString,
    },
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Firestore {
                project_id,
                client_email,
                token_uri,
                emulator_host,
                ..
            } => f
                .debug_struct("Firestore")
                .field("project_id", project_id)
                .field("client_email", client_email)
                .field("private_key", &"***")
                .field("token_uri", token_uri)
                .field("emulator_host", emulator_host)
                .finish(),
            Self::Postgres { .. } => f.debug_struct("Postgres").field("dsn", &"***").finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Options {
    pub backend: Backend,
    pub collection: String,
    pub identifier_field: String,
    pub timeout_seconds: u64,
    pub retries: u32,
}

impl Options {
    /// Parse account store arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the selected backend is missing its connection
    /// arguments.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let read = |id: &str| -> Option<String> {
            matches
                .get_one::<String>(id)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let read_required = |id: &str| -> Result<String> {
            read(id).ok_or_else(|| anyhow!("missing required argument: --{id}"))
        };

        let backend = match read(ARG_STORE).as_deref() {
            Some("postgres") => Backend::Postgres {
                dsn: SecretString::from(read_required(ARG_DSN)?),
            },
            Some("firestore") | None => {
                let emulator_host = read(ARG_FIRESTORE_EMULATOR_HOST);
                let client_email = read(ARG_FIRESTORE_CLIENT_EMAIL);
                let private_key = read(ARG_FIRESTORE_PRIVATE_KEY).map(SecretString::from);

                if emulator_host.is_none() && (client_email.is_none() || private_key.is_none()) {
                    return Err(anyhow!(
                        "missing required argument: --{ARG_FIRESTORE_CLIENT_EMAIL} and --{ARG_FIRESTORE_PRIVATE_KEY} (or --{ARG_FIRESTORE_EMULATOR_HOST})"
                    ));
                }

                Backend::Firestore {
                    project_id: read_required(ARG_FIRESTORE_PROJECT_ID)?,
                    client_email,
                    private_key,
                    token_uri: read(ARG_FIRESTORE_TOKEN_URI)
                        .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
                    emulator_host,
                }
            }
            Some(other) => return Err(anyhow!("unsupported store: {other}")),
        };

        Ok(Self {
            backend,
            collection: read_required(ARG_COLLECTION)?,
            identifier_field: read_required(ARG_IDENTIFIER_FIELD)?,
            timeout_seconds: matches
                .get_one::<u64>(ARG_STORE_TIMEOUT_SECONDS)
                .copied()
                .unwrap_or(5),
            retries: matches.get_one::<u32>(ARG_STORE_RETRIES).copied().unwrap_or(2),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_STORE)
                .long(ARG_STORE)
                .help("Account store backend")
                .env("SAPGATE_STORE")
                .default_value("firestore")
                .value_parser(PossibleValuesParser::new(["firestore", "postgres"])),
        )
        .arg(
            Arg::new(ARG_COLLECTION)
                .long(ARG_COLLECTION)
                .help("Collection (Firestore) or table (Postgres) holding the accounts")
                .env("SAPGATE_COLLECTION")
                .default_value("users"),
        )
        .arg(
            Arg::new(ARG_IDENTIFIER_FIELD)
                .long(ARG_IDENTIFIER_FIELD)
                .help("Account field matched against the login email address")
                .env("SAPGATE_IDENTIFIER_FIELD")
                .default_value("PLM Email Address"),
        )
        .arg(
            Arg::new(ARG_STORE_TIMEOUT_SECONDS)
                .long(ARG_STORE_TIMEOUT_SECONDS)
                .help("Timeout for a single account store query")
                .env("SAPGATE_STORE_TIMEOUT_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_STORE_RETRIES)
                .long(ARG_STORE_RETRIES)
                .help("Retries after a transient account store failure")
                .env("SAPGATE_STORE_RETRIES")
                .default_value("2")
                .value_parser(clap::value_parser!(u32).range(..=5)),
        )
        .arg(
            Arg::new(ARG_FIRESTORE_PROJECT_ID)
                .long(ARG_FIRESTORE_PROJECT_ID)
                .help("Google Cloud project id")
                .env("SAPGATE_FIRESTORE_PROJECT_ID"),
        )
        .arg(
            Arg::new(ARG_FIRESTORE_CLIENT_EMAIL)
                .long(ARG_FIRESTORE_CLIENT_EMAIL)
                .help("Service account client email")
                .env("SAPGATE_FIRESTORE_CLIENT_EMAIL"),
        )
        .arg(
            Arg::new(ARG_FIRESTORE_PRIVATE_KEY)
                .long(ARG_FIRESTORE_PRIVATE_KEY)
                .help("Service account private key (PEM, literal \\n accepted)")
                .env("SAPGATE_FIRESTORE_PRIVATE_KEY")
                .hide_env_values(true)
                .allow_hyphen_values(true),
        )
        .arg(
            Arg::new(ARG_FIRESTORE_TOKEN_URI)
                .long(ARG_FIRESTORE_TOKEN_URI)
                .help("OAuth token endpoint for the service account")
                .env("SAPGATE_FIRESTORE_TOKEN_URI")
                .default_value(DEFAULT_TOKEN_URI),
        )
        .arg(
            Arg::new(ARG_FIRESTORE_EMULATOR_HOST)
                .long(ARG_FIRESTORE_EMULATOR_HOST)
                .help("Firestore emulator host:port, disables authentication")
                .env("FIRESTORE_EMULATOR_HOST"),
        )
        .arg(
            Arg::new(ARG_DSN)
                .short('d')
                .long(ARG_DSN)
                .help("Postgres connection string")
                .env("SAPGATE_DSN")
                .hide_env_values(true),
        )
}
