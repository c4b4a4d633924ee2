use crate::{
    auth::{DEFAULT_MIN_SECRET_LENGTH, DEFAULT_TOKEN_TTL_SECONDS},
    sapgate::DEFAULT_ALLOWED_ORIGIN,
};
use anyhow::{anyhow, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_JWT_SECRET: &str = "jwt-secret";
pub const ARG_TOKEN_TTL_SECONDS: &str = "token-ttl-seconds";
pub const ARG_MIN_PASSWORD_LENGTH: &str = "min-password-length";
pub const ARG_ALLOWED_ORIGINS: &str = "allowed-origins";

#[derive(Clone)]
pub struct Options {
    pub jwt_secret: SecretString,
    pub token_ttl_seconds: u64,
    pub min_password_length: usize,
    pub allowed_origins: Vec<String>,
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("jwt_secret", &"***")
            .field("token_ttl_seconds", &self.token_ttl_seconds)
            .field("min_password_length", &self.min_password_length)
            .field("allowed_origins", &self.allowed_origins)
            .finish()
    }
}

impl Options {
    /// Parse token and login policy arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the signing secret is missing or blank.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let jwt_secret = matches
            .get_one::<String>(ARG_JWT_SECRET)
            .filter(|v| !v.trim().is_empty())
            .cloned()
            .ok_or_else(|| anyhow!("missing required argument: --{ARG_JWT_SECRET}"))?;

        let allowed_origins: Vec<String> = matches
            .get_many::<String>(ARG_ALLOWED_ORIGINS)
            .map(|values| {
                values
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        if allowed_origins.is_empty() {
            return Err(anyhow!("at least one --{ARG_ALLOWED_ORIGINS} is required"));
        }

        Ok(Self {
            jwt_secret: SecretString::from(jwt_secret),
            token_ttl_seconds: matches
                .get_one::<u64>(ARG_TOKEN_TTL_SECONDS)
                .copied()
                .unwrap_or(DEFAULT_TOKEN_TTL_SECONDS),
            min_password_length: matches
                .get_one::<usize>(ARG_MIN_PASSWORD_LENGTH)
                .copied()
                .unwrap_or(DEFAULT_MIN_SECRET_LENGTH),
            allowed_origins,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_JWT_SECRET)
                .long(ARG_JWT_SECRET)
                .help("Secret used to sign and verify bearer tokens")
                .env("SAPGATE_JWT_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_TOKEN_TTL_SECONDS)
                .long(ARG_TOKEN_TTL_SECONDS)
                .help("Bearer token lifetime in seconds")
                .env("SAPGATE_TOKEN_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_MIN_PASSWORD_LENGTH)
                .long(ARG_MIN_PASSWORD_LENGTH)
                .help("Shortest password accepted before the account store is queried")
                .env("SAPGATE_MIN_PASSWORD_LENGTH")
                .default_value("4")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new(ARG_ALLOWED_ORIGINS)
                .long(ARG_ALLOWED_ORIGINS)
                .help("Origins allowed by CORS, comma separated (\"*\" mirrors the request origin)")
                .env("SAPGATE_ALLOWED_ORIGINS")
                .default_value(DEFAULT_ALLOWED_ORIGIN)
                .value_delimiter(',')
                .action(ArgAction::Append),
        )
}
