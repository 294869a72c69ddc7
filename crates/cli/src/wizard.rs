//! Interactive setup wizard for cloudstore configuration

use crate::handlers::Context;
use anyhow::Result;
use cloudstore_core::config::resolve_config_path;
use cloudstore_core::sanitize::mask;
use cloudstore_core::{save_config, ConfigFile, StoreConfig};
use dialoguer::{theme::ColorfulTheme, Confirm, Input, Password, Select};
use indicatif::{ProgressBar, ProgressStyle};

/// How the client should authenticate
enum AuthMethod {
    DefaultChain,
    Profile(String),
    StaticKeys { access_key_id: String, secret_access_key: String },
}

/// Run the interactive setup wizard
pub async fn run_init_wizard(ctx: &Context) -> Result<()> {
    println!("🚀 Welcome to cloudstore setup!\n");

    let config_path = resolve_config_path(ctx.config_path.as_deref())?;
    if config_path.exists() {
        let overwrite = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("{} already exists. Replace it?", config_path.display()))
            .default(false)
            .interact()?;
        if !overwrite {
            println!("❌ Configuration unchanged");
            return Ok(());
        }
    }

    println!("This wizard will guide you through the configuration process.");
    println!("You will need:");
    println!("  1. The endpoint of your store (leave empty for AWS S3)");
    println!("  2. Its region");
    println!("  3. A profile name or an Access Key ID + Secret Access Key\n");

    // Step 1: Endpoint
    let endpoint = prompt_endpoint()?;

    // Step 2: Region
    let region = prompt_region()?;

    // Step 3: Credentials
    let auth = prompt_auth_method()?;

    // Step 4: Addressing
    let path_style = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("Use path-style addressing? (MinIO, Ceph and most self-hosted stores need it)")
        .default(endpoint.is_some())
        .interact()?;

    let mut store = StoreConfig {
        endpoint: endpoint.clone(),
        region: Some(region.clone()),
        path_style,
        ..Default::default()
    };
    let auth_summary = match auth {
        AuthMethod::DefaultChain => "Default provider chain".to_string(),
        AuthMethod::Profile(profile) => {
            let summary = format!("Profile '{}'", profile);
            store.profile = Some(profile);
            summary
        }
        AuthMethod::StaticKeys {
            access_key_id,
            secret_access_key,
        } => {
            let summary = format!("Access Keys ({})", mask(&access_key_id));
            store.access_key_id = Some(access_key_id);
            store.secret_access_key = Some(secret_access_key);
            summary
        }
    };

    // Summary
    println!("\n📋 Configuration summary:");
    println!("  Endpoint: {}", endpoint.as_deref().unwrap_or("AWS S3"));
    println!("  Region: {}", region);
    println!("  Path style: {}", path_style);
    println!("  Auth: {}", auth_summary);

    // Confirmation
    let confirm = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("Save this configuration?")
        .default(false)
        .interact()?;

    if !confirm {
        println!("❌ Configuration cancelled");
        return Ok(());
    }

    let config = ConfigFile {
        store,
        ..Default::default()
    };

    // Save config
    let pb = ProgressBar::new(1);
    pb.set_style(
        ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] {msg}")?,
    );
    pb.set_message("Saving configuration...");

    let saved_to = save_config(&config, ctx.config_path.as_deref())?;

    pb.inc(1);
    pb.finish_with_message("✅ Configuration saved!");

    println!("\n🎉 Setup complete!");
    println!("\nConfiguration saved to: {}", saved_to.display());
    println!("\nYou can now use cloudstore:");
    println!("  $ cloudstore storediag s3://my-bucket/");
    println!("  $ cloudstore ls s3://my-bucket/path/");
    println!("  $ cloudstore config show");

    Ok(())
}

/// Prompt for a custom endpoint; empty means AWS
fn prompt_endpoint() -> Result<Option<String>> {
    let endpoint: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Endpoint URL (empty for AWS S3)")
        .allow_empty(true)
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.is_empty() || input.starts_with("http://") || input.starts_with("https://") {
                Ok(())
            } else {
                Err("Endpoint must start with http:// or https://")
            }
        })
        .interact_text()
        .map_err(|e| anyhow::anyhow!("Failed to get endpoint: {}", e))?;

    Ok(Some(endpoint.trim().to_string()).filter(|e| !e.is_empty()))
}

/// Prompt for the region
fn prompt_region() -> Result<String> {
    Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Region")
        .default(cloudstore_core::client::DEFAULT_REGION.to_string())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Region cannot be empty")
            } else if input.contains(char::is_whitespace) {
                Err("Region cannot contain spaces")
            } else {
                Ok(())
            }
        })
        .interact_text()
        .map_err(|e| anyhow::anyhow!("Failed to get region: {}", e))
}

/// Prompt for authentication method
fn prompt_auth_method() -> Result<AuthMethod> {
    let auth_methods = vec![
        "Default provider chain (environment, ~/.aws, instance role)",
        "Named profile from ~/.aws/config",
        "Access Key ID + Secret Access Key",
    ];

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Authentication method")
        .items(&auth_methods)
        .default(0)
        .interact()
        .map_err(|e| anyhow::anyhow!("Failed to select auth method: {}", e))?;

    match selection {
        1 => {
            let profile = Input::with_theme(&ColorfulTheme::default())
                .with_prompt("Profile name")
                .default("default".to_string())
                .interact_text()
                .map_err(|e| anyhow::anyhow!("Failed to get profile: {}", e))?;

            Ok(AuthMethod::Profile(profile))
        }
        2 => {
            let access_key_id = Input::with_theme(&ColorfulTheme::default())
                .with_prompt("Access Key ID")
                .validate_with(|input: &String| -> Result<(), &str> {
                    if input.is_empty() {
                        Err("Access Key ID cannot be empty")
                    } else {
                        Ok(())
                    }
                })
                .interact_text()
                .map_err(|e| anyhow::anyhow!("Failed to get Access Key ID: {}", e))?;

            let secret_access_key = Password::with_theme(&ColorfulTheme::default())
                .with_prompt("Secret Access Key")
                .validate_with(|input: &String| -> Result<(), &str> {
                    if input.is_empty() {
                        Err("Secret Access Key cannot be empty")
                    } else {
                        Ok(())
                    }
                })
                .interact()
                .map_err(|e| anyhow::anyhow!("Failed to get Secret Access Key: {}", e))?;

            Ok(AuthMethod::StaticKeys {
                access_key_id,
                secret_access_key,
            })
        }
        _ => Ok(AuthMethod::DefaultChain),
    }
}
