mod api;
mod cache;
mod core;
mod database;
mod reader;
mod rules;
mod servers;
mod setup_logger;
mod storage;

use crate::api::ApiResponse;
use crate::cache::{RedisCache, RuleCache};
use crate::core::error::InitProcessError;
use crate::core::{Actor, AppResult, Configuration, RulePropagator};
use crate::database::Database;
use crate::reader::RuleReader;
use crate::rules::{BulkForm, RuleForm, RuleRequest, ScopeFields};
use crate::servers::{RegistryError, ServerRegistry};
use crate::setup_logger::setup_logger;
use crate::storage::migrations::run_migrations;
use crate::storage::{AuditSchema, AuditStore, PostgresAuditStore};
use clap::{Args, Parser, Subcommand};
use log::{error, info};
use serde::Serialize;
use std::sync::Arc;

/// ファイアウォールルールの変更をエージェント群へ配布する
#[derive(Parser)]
#[command(name = "fwctl", version, about = "ファイアウォールルールの配布と監査")]
struct Cli {
    #[command(flatten)]
    actor: ActorArgs,

    #[command(subcommand)]
    command: Command,
}

/// 操作者の情報。認証は呼び出し側で済ませておくこと。
#[derive(Args)]
struct ActorArgs {
    #[arg(long, global = true, default_value_t = 0)]
    actor_id: i64,

    #[arg(long, global = true, default_value = "cli")]
    actor_name: String,

    #[arg(long, global = true, default_value = "cli")]
    actor_ip: String,

    #[arg(long, global = true, default_value = "cli")]
    user_agent: String,

    /// 全操作者のルールとログを閲覧する
    #[arg(long, global = true)]
    superadmin: bool,
}

#[derive(Subcommand)]
enum Command {
    /// 単一フォームでルールを追加/削除する (ip, port はカンマ区切り可)
    Apply {
        verb: String,
        #[arg(long)]
        ip: Option<String>,
        #[arg(long)]
        port: Option<String>,
        #[arg(long)]
        comment: Option<String>,
        #[arg(long)]
        target_server: Option<String>,
        #[arg(long)]
        target_servers: Option<String>,
        #[arg(long)]
        target_group: Option<String>,
        #[arg(long)]
        target_groups: Option<String>,
    },
    /// JSONエントリ配列またはレガシーCSVで一括処理する
    Bulk {
        verb: String,
        #[arg(long)]
        entries: Option<String>,
        #[arg(long)]
        pairs: Option<String>,
        #[arg(long)]
        ips: Option<String>,
        #[arg(long)]
        ports: Option<String>,
        #[arg(long)]
        comment: Option<String>,
    },
    /// 現在有効なルールの一覧
    List,
    /// 直近の監査ログと24時間の統計
    Logs {
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
    Servers {
        #[command(subcommand)]
        command: ServersCommand,
    },
    /// 監査テーブルを作成する
    Migrate,
}

#[derive(Subcommand)]
enum ServersCommand {
    List,
    Add { server_id: String },
}

fn print_json<T: Serialize>(value: &T) -> AppResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_response(response: &ApiResponse) -> AppResult<()> {
    print_json(response)?;
    if !response.ok {
        std::process::exit(1);
    }
    Ok(())
}

impl ActorArgs {
    fn actor(&self) -> Actor {
        Actor {
            id: self.actor_id,
            name: self.actor_name.clone(),
            ip: self.actor_ip.clone(),
            user_agent: self.user_agent.clone(),
        }
    }
}

/// 入力検証を終えたサブコマンド。ここまではどのストアにも接続しない。
enum Task {
    Migrate,
    Propagate(RuleRequest),
    List,
    Logs { limit: i64 },
    Servers(ServersCommand),
}

impl Task {
    /// 検証に失敗した場合はそのまま返す応答
    fn from_command(command: Command) -> Result<Self, ApiResponse> {
        match command {
            Command::Migrate => Ok(Task::Migrate),
            Command::Apply {
                verb,
                ip,
                port,
                comment,
                target_server,
                target_servers,
                target_group,
                target_groups,
            } => {
                let form = RuleForm {
                    ip,
                    port,
                    comment,
                    scope: ScopeFields {
                        target_server,
                        target_servers,
                        target_group,
                        target_groups,
                    },
                };
                api::prepare(&verb, &form).map(Task::Propagate)
            }
            Command::Bulk {
                verb,
                entries,
                pairs,
                ips,
                ports,
                comment,
            } => {
                let form = BulkForm {
                    entries,
                    pairs,
                    ips,
                    ports,
                    comment,
                };
                api::prepare_bulk(&verb, &form).map(Task::Propagate)
            }
            Command::List => Ok(Task::List),
            Command::Logs { limit } => Ok(Task::Logs { limit }),
            Command::Servers { command } => Ok(Task::Servers(command)),
        }
    }

    /// 監査テーブルを使うタスクだけがPostgresに接続する
    fn needs_database(&self) -> bool {
        !matches!(self, Task::Servers(_))
    }
}

async fn connect_cache(config: &Configuration) -> Result<Arc<dyn RuleCache>, InitProcessError> {
    let cache = RedisCache::connect(&config.cache)
        .await
        .map_err(|e| InitProcessError::CacheConnectionError(e.to_string()))?;
    Ok(Arc::new(cache))
}

async fn connect_database(config: &Configuration) -> Result<Database, InitProcessError> {
    Database::connect(&config.database)
        .await
        .map_err(|e| InitProcessError::DatabaseConnectionError(e.to_string()))
}

async fn connect_audit(db: &Database) -> Result<Arc<dyn AuditStore>, InitProcessError> {
    let schema = AuditSchema::detect(db)
        .await
        .map_err(|e| InitProcessError::SchemaDetectionError(e.to_string()))?;
    Ok(Arc::new(PostgresAuditStore::new(db.clone(), schema)))
}

#[tokio::main]
async fn main() {
    if let Err(e) = run(Cli::parse()).await {
        error!("処理を中断しました: {}", e);
        if let Err(e) = print_response(&ApiResponse::failure(e.to_string())) {
            eprintln!("{}", e);
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> AppResult<()> {
    let config = Configuration::from_env()?;
    setup_logger(&config.logging)?;

    let actor = cli.actor.actor();
    let viewer = actor.viewer(cli.actor.superadmin);

    let task = match Task::from_command(cli.command) {
        Ok(task) => task,
        Err(rejected) => return print_response(&rejected),
    };
    if !task.needs_database() {
        if let Task::Servers(command) = task {
            return run_servers(&config, command).await;
        }
    }

    let db = connect_database(&config).await?;
    match task {
        Task::Migrate => {
            run_migrations(&db).await?;
            info!("マイグレーションが完了しました");
            print_response(&ApiResponse::success())
        }
        Task::Propagate(request) => {
            // 監査ストアは必須。キャッシュは接続できなくても操作ごとにERRとして記録する。
            let audit = connect_audit(&db).await?;
            let cache = cache::connect_or_unavailable(&config.cache).await;
            let propagator = RulePropagator::new(cache, audit, config.cache.channel.clone());
            print_response(&api::execute(&propagator, request, &actor).await)
        }
        Task::List => {
            let reader = RuleReader::new(connect_cache(&config).await?, connect_audit(&db).await?);
            match reader.list(viewer).await {
                Ok(listing) => print_json(&listing),
                Err(e) => {
                    error!("ルール一覧の取得に失敗しました: {}", e);
                    print_response(&ApiResponse::failure(e.to_string()))
                }
            }
        }
        Task::Logs { limit } => {
            let audit = connect_audit(&db).await?;
            print_json(&api::audit_overview(audit.as_ref(), viewer, limit).await?)
        }
        Task::Servers(command) => run_servers(&config, command).await,
    }
}

async fn run_servers(config: &Configuration, command: ServersCommand) -> AppResult<()> {
    let registry = ServerRegistry::new(connect_cache(config).await?);
    match command {
        ServersCommand::List => print_json(&registry.list().await?),
        ServersCommand::Add { server_id } => match registry.add(&server_id).await {
            Ok(_) => print_response(&ApiResponse::success()),
            Err(RegistryError::Validation(e)) => print_response(&ApiResponse::rejected(&e)),
            Err(e) => {
                error!("サーバーの登録に失敗しました: {}", e);
                print_response(&ApiResponse::failure(e.to_string()))
            }
        },
    }
}
