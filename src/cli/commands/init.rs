//! Init command handler

use crate::config::Config;
use crate::db::Store;
use crate::db::migrator::{DEFAULT_ADMIN_PASSWORD, DEFAULT_ADMIN_USERNAME};

pub async fn cmd_init(config: &Config) -> anyhow::Result<()> {
    let created = Config::create_default_if_missing()?;
    if created {
        println!("✓ Config file created: config.toml");
    } else {
        println!("• config.toml already exists, leaving it untouched");
    }

    let store = Store::new(&config.general.database_path).await?;
    let admins = store.admin_count().await?;
    println!(
        "✓ Database ready at {} ({admins} admin account(s))",
        config.general.database_path
    );

    if created {
        println!();
        println!("Default admin account:");
        println!("  username: {DEFAULT_ADMIN_USERNAME}");
        println!("  password: {DEFAULT_ADMIN_PASSWORD}");
        println!("Change this password after the first login.");
    }

    Ok(())
}
