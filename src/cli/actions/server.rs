use crate::{
    auth::{CredentialVerifier, TokenSigner},
    cli::commands::{auth, store, store::Backend},
    sapgate,
    store::{
        firestore::ServiceAccount, AccountStore, FirestoreConfig, FirestoreStore, GuardedStore,
        PostgresStore, RetryPolicy,
    },
};
use anyhow::Result;
use secrecy::ExposeSecret;
use std::{sync::Arc, time::Duration};
use tracing::info;

#[derive(Debug, Clone)]
pub struct Args {
    pub port: u16,
    pub auth: auth::Options,
    pub store: store::Options,
}

/// Build the account store, signer and verifier, then serve until shutdown.
/// # Errors
/// Returns an error if the store cannot be prepared or the server fails.
pub async fn execute(args: Args) -> Result<()> {
    let policy = RetryPolicy::new()
        .with_timeout(Duration::from_secs(args.store.timeout_seconds))
        .with_retries(args.store.retries);

    info!(
        "Store calls time out after {:?} with up to {} retries",
        policy.timeout(),
        policy.retries()
    );

    let accounts = open_store(&args.store, policy).await?;

    let signer = TokenSigner::new(
        &args.auth.jwt_secret,
        Duration::from_secs(args.auth.token_ttl_seconds),
    );
    info!("Tokens expire {:?} after issue", signer.ttl());

    let verifier = CredentialVerifier::new(accounts, signer)
        .with_min_secret_length(args.auth.min_password_length);

    sapgate::new(args.port, Arc::new(verifier), &args.auth.allowed_origins).await
}

async fn open_store(
    options: &store::Options,
    policy: RetryPolicy,
) -> Result<Arc<dyn AccountStore>> {
    let accounts: Arc<dyn AccountStore> = match &options.backend {
        Backend::Firestore {
            project_id,
            client_email,
            private_key,
            token_uri,
            emulator_host,
        } => {
            let mut config = FirestoreConfig::new(
                project_id.clone(),
                options.collection.clone(),
                options.identifier_field.clone(),
            );

            if let Some(host) = emulator_host {
                info!("Using Firestore emulator at {}", host);
                config = config.with_emulator_host(host);
            } else if let (Some(client_email), Some(private_key)) = (client_email, private_key) {
                config = config.with_service_account(ServiceAccount {
                    client_email: client_email.clone(),
                    private_key: private_key.clone(),
                    token_uri: token_uri.clone(),
                });
            }

            Arc::new(GuardedStore::new(FirestoreStore::new(config)?, policy))
        }
        Backend::Postgres { dsn } => {
            let pg = PostgresStore::connect(
                dsn.expose_secret(),
                &options.collection,
                &options.identifier_field,
            )
            .await?;

            Arc::new(GuardedStore::new(pg, policy))
        }
    };

    info!(
        "Account store ready: collection={}, identifier_field={}",
        options.collection, options.identifier_field
    );

    Ok(accounts)
}
