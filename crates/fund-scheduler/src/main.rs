//! 펀드 포털 배치 CLI.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use fund_core::{
    init_logging, AccrualStore, Clock, GracePolicy, LogConfig, RecalculationScheduler,
    ReturnSource, SystemClock,
};
use fund_data::{
    Database, DatabaseConfig, DbReturnSource, PgAccrualStore, ReturnRepository,
    SubprocessReturnSource,
};
use fund_scheduler::config::ReturnSourceKind;
use fund_scheduler::modules::{self, ImportSource};
use fund_scheduler::{SchedulerConfig, SchedulerError};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "fund-scheduler")]
#[command(about = "Fund portal batch jobs", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 로그 레벨 (trace, debug, info, warn, error). 생략하면 설정 파일 값 사용
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// 하루치 야간 증분 계산 (실거래 클라이언트)
    Nightly {
        /// 처리 날짜 (YYYY-MM-DD, 기본: 오늘)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// 한 클라이언트 전체 재계산
    Recompute {
        /// 클라이언트 ID
        #[arg(long)]
        client: Uuid,
    },

    /// 반영 입금이 있는 모든 클라이언트 전체 재계산
    RecomputeAll,

    /// 일일 수익률 CSV 가져오기
    ImportReturns {
        /// 로컬 CSV 파일
        #[arg(long, conflicts_with = "url")]
        file: Option<PathBuf>,

        /// 원격 CSV URL (생략 시 설정의 returns_csv_url)
        #[arg(long)]
        url: Option<String>,
    },

    /// 반기 명세서 발급 대상 확인
    StatementsDue {
        /// 기준 날짜 (YYYY-MM-DD, 기본: 오늘)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// 데몬 모드: 매일 설정된 시각에 야간 계산 실행
    Daemon,
}

/// 저장소와 스케줄러 묶음.
struct Runtime {
    db: Database,
    store: Arc<dyn AccrualStore>,
    returns: ReturnRepository,
    scheduler: RecalculationScheduler,
    policy: GracePolicy,
    clock: Arc<dyn Clock>,
}

impl Runtime {
    async fn connect(config: &SchedulerConfig) -> Result<Self, SchedulerError> {
        let db = Database::connect(&DatabaseConfig::from_settings(
            config.database_url.clone(),
            &config.app.database,
        ))
        .await?;
        tracing::info!("데이터베이스 연결 성공");

        let pg_store = PgAccrualStore::new(db.clone());
        let returns = pg_store.returns().clone();
        let store: Arc<dyn AccrualStore> = Arc::new(pg_store);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let source: Arc<dyn ReturnSource> = match config.return_source {
            ReturnSourceKind::Database => Arc::new(DbReturnSource::new(returns.clone())),
            ReturnSourceKind::Backtest => {
                Arc::new(SubprocessReturnSource::from_config(&config.app.accrual))
            }
        };
        tracing::debug!(source = source.name(), "수익률 소스 선택");

        let scheduler = RecalculationScheduler::new(store.clone(), source, clock.clone())
            .with_source_timeout(config.app.accrual.return_source_timeout())
            .with_skip_weekends(config.app.accrual.skip_weekends);

        Ok(Self {
            db,
            store,
            returns,
            scheduler,
            policy: config.app.statements.grace_policy(),
            clock,
        })
    }

    fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// 명세서 대상 확인 후 요약 로그.
    async fn statements_due(&self, date: NaiveDate) -> Result<(), SchedulerError> {
        let (due, stats) =
            modules::find_due_statements(self.store.as_ref(), date, &self.policy).await?;
        stats.log_summary("명세서 대상 확인");
        if !due.is_empty() {
            tracing::info!(date = %date, count = due.len(), "새 반기 명세서 발급 가능");
        }
        Ok(())
    }

    /// 데몬 한 주기: 야간 계산과 명세서 확인.
    async fn daemon_run(&self, config: &SchedulerConfig, date: NaiveDate) {
        if config.daemon.import_before_nightly {
            match &config.app.accrual.returns_csv_url {
                Some(url) => {
                    match modules::import_returns(&self.returns, &ImportSource::Url(url.clone()))
                        .await
                    {
                        Ok(stats) => stats.log_summary("수익률 가져오기"),
                        Err(e) => tracing::error!("수익률 가져오기 실패: {}", e),
                    }
                }
                None => tracing::warn!("IMPORT_BEFORE_NIGHTLY 설정됨, returns_csv_url 없음"),
            }
        }

        match modules::run_nightly(&self.scheduler, date).await {
            Ok(stats) => stats.log_summary("야간 계산"),
            Err(e) => tracing::error!("야간 계산 실패: {}", e),
        }

        if let Err(e) = self.statements_due(date).await {
            tracing::error!("명세서 대상 확인 실패: {}", e);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // 설정 로드 (.env 포함)
    let config = SchedulerConfig::from_env()?;

    // 로깅 초기화
    let mut log_config = LogConfig::from(&config.app.logging);
    if let Some(level) = cli.log_level {
        log_config.level = level;
    }
    init_logging(log_config)?;

    tracing::info!("Fund Scheduler 시작");

    let runtime = Runtime::connect(&config).await?;

    match cli.command {
        Commands::Nightly { date } => {
            let date = date.unwrap_or_else(|| runtime.today());
            let stats = modules::run_nightly(&runtime.scheduler, date).await?;
            stats.log_summary("야간 계산");
        }
        Commands::Recompute { client } => {
            let stats = modules::recompute_client(&runtime.scheduler, client).await?;
            stats.log_summary("클라이언트 재계산");
        }
        Commands::RecomputeAll => {
            let stats = modules::recompute_all(&runtime.scheduler).await?;
            stats.log_summary("전체 재계산");
        }
        Commands::ImportReturns { file, url } => {
            let source = match (file, url.or_else(|| config.app.accrual.returns_csv_url.clone())) {
                (Some(path), _) => ImportSource::File(path),
                (None, Some(url)) => ImportSource::Url(url),
                (None, None) => {
                    return Err("--file 또는 --url이 필요합니다 (returns_csv_url 미설정)".into());
                }
            };
            let stats = modules::import_returns(&runtime.returns, &source).await?;
            stats.log_summary("수익률 가져오기");
        }
        Commands::StatementsDue { date } => {
            let date = date.unwrap_or_else(|| runtime.today());
            runtime.statements_due(date).await?;
        }
        Commands::Daemon => {
            tracing::info!(
                "=== 데몬 모드 시작 (주기: {}분, 야간 계산: {}시 {}) ===",
                config.daemon.interval_minutes,
                config.daemon.nightly_hour,
                config.daemon.timezone
            );

            let mut interval = tokio::time::interval(config.daemon.interval());
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut last_run: Option<NaiveDate> = None;

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("종료 신호 수신, 데몬 종료 중...");
                        break;
                    }
                    _ = interval.tick() => {
                        let Some(date) = config.daemon.nightly_due(Utc::now(), last_run) else {
                            continue;
                        };

                        tracing::info!(date = %date, "=== 야간 작업 시작 ===");
                        runtime.daemon_run(&config, date).await;
                        last_run = Some(date);
                        tracing::info!(date = %date, "=== 야간 작업 완료 ===");
                    }
                }
            }
        }
    }

    runtime.db.pool().close().await;
    tracing::info!("Fund Scheduler 종료");

    Ok(())
}
