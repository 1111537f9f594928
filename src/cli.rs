use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use ethers::types::{Address, Bytes, H256};
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::accounts::SIMPLE_ACCOUNT;
use crate::core::config::WalletConfig;
use crate::core::domain::{AccountContext, SigningContext, TransactionIntent};
use crate::service::WalletService;

/// Smart-account wallet CLI (library-facing definitions)
#[derive(Debug, Parser)]
#[command(name = "aa-wallet", about = "ERC-4337 smart-account wallet", version)]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true, default_value = "config.toml")]
    pub config: PathBuf,

    /// Vault password
    #[arg(long, global = true, env = "WALLET_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create a new, empty vault
    Init,
    /// Create an account and store it in the vault
    AddAccount {
        /// Account implementation ("simple" or "approval")
        #[arg(long, default_value = SIMPLE_ACCOUNT)]
        kind: String,
        /// Import this owner key (hex) instead of generating one
        #[arg(long, env = "WALLET_OWNER_KEY", hide_env_values = true)]
        private_key: Option<String>,
        /// Factory salt
        #[arg(long)]
        index: Option<u64>,
    },
    /// List accounts with deployment status and balance
    Accounts,
    /// Build and print an estimated, unsigned user operation
    BuildOp(IntentArgs),
    /// Build, sign and submit a user operation
    Send(IntentArgs),
    /// Show inclusion status of a submitted user operation
    Receipt {
        #[arg(long)]
        account: Address,
        #[arg(long)]
        hash: H256,
    },
    /// Sign an arbitrary message with an account's owner key
    SignMessage {
        #[arg(long)]
        account: Address,
        #[arg(long)]
        message: String,
        /// Confirm the signature for accounts that require approval
        #[arg(long)]
        approve: bool,
    },
}

#[derive(Debug, ClapArgs)]
pub struct IntentArgs {
    #[arg(long)]
    pub account: Address,
    #[arg(long)]
    pub to: Address,
    /// Value in wei, decimal or 0x hex
    #[arg(long)]
    pub value: Option<String>,
    /// Call data as 0x hex
    #[arg(long)]
    pub data: Option<Bytes>,
    #[arg(long)]
    pub call_gas_limit: Option<String>,
    #[arg(long)]
    pub max_fee_per_gas: Option<String>,
    #[arg(long)]
    pub max_priority_fee_per_gas: Option<String>,
    /// Confirm the signature for accounts that require approval
    #[arg(long)]
    pub approve: bool,
    /// Skip relay estimation and use the account's own gas floors
    #[arg(long)]
    pub no_estimate: bool,
}

impl IntentArgs {
    fn intent(&self) -> TransactionIntent {
        TransactionIntent {
            to: self.to,
            data: self.data.clone(),
            value: self.value.clone(),
            call_gas_limit: self.call_gas_limit.clone(),
            max_fee_per_gas: self.max_fee_per_gas.clone(),
            max_priority_fee_per_gas: self.max_priority_fee_per_gas.clone(),
        }
    }
}

fn signing_context(approve: bool) -> SigningContext {
    if approve {
        SigningContext::approved()
    } else {
        SigningContext::default()
    }
}

/// Config file if present, otherwise defaults; `WALLET_*` overrides apply either way.
pub fn load_config(path: &Path) -> anyhow::Result<WalletConfig> {
    if path.exists() {
        return WalletConfig::load(path).with_context(|| format!("loading {}", path.display()));
    }
    warn!("Config file {} not found, using defaults", path.display());
    let mut config = WalletConfig::default();
    config.apply_env_overrides()?;
    config.validate()?;
    Ok(config)
}

fn password(cli: &Cli) -> anyhow::Result<SecretString> {
    cli.password
        .clone()
        .map(SecretString::new)
        .context("a vault password is required (--password or WALLET_PASSWORD)")
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli.config)?;
    let service = WalletService::init(config).await?;
    let keyring = service.keyring();

    if let Commands::Init = cli.command {
        keyring.create_new_vault(password(&cli)?).await?;
        info!(path = %service.config().storage.vault_path.display(), "Vault created");
        println!("vault created at {}", service.config().storage.vault_path.display());
        return Ok(());
    }

    let restored = service.open_vault(password(&cli)?).await?;
    info!(accounts = restored.len(), "Vault opened");

    match cli.command {
        Commands::Init => {}
        Commands::AddAccount { kind, private_key, index } => {
            let ctx = AccountContext { private_key: private_key.map(SecretString::new), index };
            let address = keyring.add(&kind, Some(ctx)).await?;
            println!("{:?}", address);
        }
        Commands::Accounts => {
            for address in keyring.addresses() {
                let quote = keyring.account_quote(address).await?;
                println!("{}", serde_json::to_string_pretty(&quote)?);
            }
        }
        Commands::BuildOp(args) => {
            let ctx = signing_context(args.approve);
            let op = if args.no_estimate {
                keyring.create_provisional_user_op(args.account, &args.intent(), &ctx).await?
            } else {
                keyring.create_unsigned_user_op(args.account, &args.intent(), &ctx).await?
            };
            println!("{}", serde_json::to_string_pretty(&op)?);
        }
        Commands::Send(args) => {
            let ctx = signing_context(args.approve);
            let unsigned = if args.no_estimate {
                keyring.create_provisional_user_op(args.account, &args.intent(), &ctx).await?
            } else {
                keyring.create_unsigned_user_op(args.account, &args.intent(), &ctx).await?
            };
            let signed = keyring.sign_user_op(args.account, unsigned, &ctx).await?;
            let hash = keyring.send_user_op(args.account, &signed).await?;
            println!("{:?}", hash);
        }
        Commands::Receipt { account, hash } => {
            let status = keyring.user_op_receipt(account, hash).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::SignMessage { account, message, approve } => {
            let signature =
                keyring.sign_message(account, message.as_bytes(), &signing_context(approve)).await?;
            println!("{}", signature);
        }
    }

    keyring.lock();
    Ok(())
}
