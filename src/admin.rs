//! Offline user administration for the `user` commands.

use std::io::BufRead;

use anyhow::{Context as _, anyhow, bail};

use crate::archive::Validate as _;
use crate::auth;
use crate::cli::{UserCreateArgs, UserDeleteArgs};
use crate::config::Config;
use crate::model::{CreateUserRequest, User};
use crate::slug;
use crate::store::{SqliteStore, StoreError, UserRecord, UserStore as _};

/// Reads one line, without its line ending.
fn read_line(input: &mut impl BufRead) -> anyhow::Result<String> {
    let mut line = String::new();
    input.read_line(&mut line).context("read stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_owned())
}

fn open_store(config: &Config) -> anyhow::Result<SqliteStore> {
    SqliteStore::open(&config.db_filepath)
        .with_context(|| format!("open database {}", config.db_filepath.display()))
}

pub async fn create_user(args: UserCreateArgs) -> anyhow::Result<()> {
    let config = Config::load(&args.config)?;
    let password = read_line(&mut std::io::stdin().lock())?;

    let req = CreateUserRequest {
        user_id: args.name,
        user: Some(User {
            password,
            ..Default::default()
        }),
    };
    req.validate().map_err(|violation| anyhow!("invalid user: {violation}"))?;
    let name = req.user_id;
    let password = req.user.map(|user| user.password).unwrap_or_default();

    let password_hash = tokio::task::spawn_blocking(move || auth::hash_password(&password))
        .await
        .context("hash password")??;
    let store = open_store(&config)?;
    let created = store
        .upsert_user(&UserRecord {
            id: 0,
            name: name.clone(),
            password_hash,
        })
        .await
        .map_err(|err| match err {
            StoreError::AlreadyExists => anyhow!("user {name:?} already exists"),
            other => anyhow!(other).context("create user"),
        })?;

    tracing::info!(user = %created.name, id = created.id, "created user");
    println!("{}", slug::user_path(&created.name));
    Ok(())
}

pub async fn delete_user(args: UserDeleteArgs) -> anyhow::Result<()> {
    let config = Config::load(&args.config)?;
    let store = open_store(&config)?;

    let user = match store.get_user_by_name(&args.name).await {
        Ok(user) => user,
        Err(StoreError::NotFound) => bail!("user {:?} does not exist", args.name),
        Err(err) => return Err(anyhow!(err).context("look up user")),
    };

    if !args.yes {
        eprint!(
            "delete {} and all of their data? [y/N] ",
            slug::user_path(&user.name)
        );
        let answer = read_line(&mut std::io::stdin().lock())?;
        if !matches!(answer.trim(), "y" | "Y" | "yes") {
            eprintln!("aborted");
            return Ok(());
        }
    }

    store.delete_user(user.id).await.context("delete user")?;
    tracing::info!(user = %user.name, "deleted user");
    println!("deleted {}", slug::user_path(&user.name));
    Ok(())
}
