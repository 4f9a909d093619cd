use std::env;

use anyhow::{bail, Context, Result};
use diesel::prelude::*;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use correction_orders::{
    auth::password,
    config::AppConfig,
    db,
    models::{NewUser, ROLES},
    orders::store,
    schema::users,
    storage::{FileStorage, LocalStorage},
};

const USAGE: &str = "Usage:
  maintenance hash-password <password>
  maintenance create-user <username> <password> <role>
  maintenance prune-uploads";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["hash-password", plain] => println!("{}", password::hash_password(plain)?),
        ["create-user", username, plain, role] => create_user(username, plain, role)?,
        ["prune-uploads"] => prune_uploads().await?,
        [cmd, ..] => {
            eprintln!("Unknown command: {cmd}\n{USAGE}");
            std::process::exit(1);
        }
        [] => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }

    Ok(())
}

fn create_user(username: &str, plain: &str, role: &str) -> Result<()> {
    if !ROLES.contains(&role) {
        bail!("unknown role {role:?}; expected one of {}", ROLES.join(", "));
    }

    let config = AppConfig::from_env()?;
    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    db::run_migrations(&pool)?;
    let mut conn = pool.get().context("failed to get database connection")?;

    let new_user = NewUser {
        id: Uuid::new_v4(),
        username: username.to_string(),
        password_hash: password::hash_password(plain)?,
        role: role.to_string(),
    };
    diesel::insert_into(users::table)
        .values(&new_user)
        .execute(&mut conn)
        .with_context(|| format!("failed to create user {username}"))?;

    println!("Created {role} {username} ({}).", new_user.id);
    Ok(())
}

/// Removes stored uploads that no order references any more.
async fn prune_uploads() -> Result<()> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        upload_dir = %config.upload_dir.display(),
        "loaded configuration"
    );
    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    let storage = LocalStorage::new(config.upload_dir.clone()).await?;

    let referenced = {
        let mut conn = pool.get().context("failed to get database connection")?;
        store::referenced_files(&mut conn).context("failed to load referenced uploads")?
    };

    let orphans: Vec<String> = storage
        .list()
        .await?
        .into_iter()
        .filter(|reference| !referenced.contains(reference))
        .collect();

    if orphans.is_empty() {
        println!("No orphaned uploads found.");
        return Ok(());
    }

    println!("Removing {} orphaned uploads…", orphans.len());
    for reference in &orphans {
        if let Err(err) = storage.remove(reference).await {
            eprintln!("Failed to remove {reference}: {err}");
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
