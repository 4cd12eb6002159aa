//! 펀드 클라이언트 포털 API 서버.
//!
//! Axum 기반 REST API 서버를 시작합니다.
//! 인증, 입출금, 성과/명세서 조회, 고객 지원, 관리자 재계산 엔드포인트를 제공합니다.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{http::StatusCode, middleware, routing::get, Extension, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use fund_api::auth::JwtConfig;
use fund_api::metrics::setup_metrics_recorder;
use fund_api::middleware::{metrics_layer, rate_limit_middleware, RateLimitConfig, RateLimitState};
use fund_api::openapi::swagger_ui_router;
use fund_api::routes::create_api_router;
use fund_api::state::AppState;
use fund_core::{
    init_logging, AccrualStore, AppConfig, Clock, LogConfig, RecalculationScheduler,
    ReturnSource, SystemClock,
};
use fund_data::{
    CumulativeReturnCache, Database, DatabaseConfig, DbReturnSource, PgAccrualStore,
    ReturnRepository, SubprocessReturnSource,
};

/// 일일 수익률 소스 선택.
///
/// `RETURN_SOURCE=db`면 저장된 수익률 테이블을, 그 외에는 백테스트 프로세스를 사용합니다.
fn select_return_source(config: &AppConfig, returns: ReturnRepository) -> Arc<dyn ReturnSource> {
    match std::env::var("RETURN_SOURCE").as_deref() {
        Ok("db") => {
            info!("Return source: algorithm_daily_returns table");
            Arc::new(DbReturnSource::new(returns))
        }
        _ => {
            info!(
                command = %config.accrual.backtest_command,
                script = %config.accrual.backtest_script,
                "Return source: backtest subprocess"
            );
            Arc::new(SubprocessReturnSource::from_config(&config.accrual))
        }
    }
}

/// CORS 레이어 생성.
///
/// CORS_ORIGINS 환경변수가 설정되어 있으면 해당 origin만 허용합니다.
/// 설정되지 않으면 개발 모드로 간주하여 모든 origin을 허용합니다.
fn cors_layer() -> CorsLayer {
    let allow_origin = match std::env::var("CORS_ORIGINS") {
        Ok(origins) if !origins.is_empty() => {
            let origins: Vec<_> = origins
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();

            if origins.is_empty() {
                warn!("CORS_ORIGINS is set but contains no valid origins, allowing any");
                AllowOrigin::any()
            } else {
                info!("CORS configured with {} allowed origins", origins.len());
                AllowOrigin::list(origins)
            }
        }
        _ => {
            warn!("CORS_ORIGINS not set, allowing any origin (development mode)");
            AllowOrigin::any()
        }
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
            axum::http::header::ACCEPT,
        ])
        .allow_credentials(std::env::var("CORS_ORIGINS").is_ok())
        .max_age(Duration::from_secs(3600))
}

/// /metrics 엔드포인트 핸들러.
async fn metrics_handler(
    axum::extract::State(handle): axum::extract::State<PrometheusHandle>,
) -> String {
    handle.render()
}

/// Rate Limit 비활성화 여부 확인.
fn is_rate_limit_disabled() -> bool {
    std::env::var("RATE_LIMIT_DISABLED")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
}

/// 전체 라우터 생성.
fn create_router(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let request_timeout = Duration::from_secs(state.config.server.request_timeout_secs);
    let jwt = state.jwt.clone();

    // 메트릭 라우터 (별도 상태, Rate Limit 제외)
    let metrics_router = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics_handle);

    let api_router = if is_rate_limit_disabled() {
        info!("Rate limiting DISABLED (RATE_LIMIT_DISABLED=true)");
        create_api_router().with_state(state)
    } else {
        let rpm = state.config.server.rate_limit_rpm;
        info!(requests_per_minute = rpm, "Rate limiting configured");
        let rate_limit_state = RateLimitState::new(RateLimitConfig::new(rpm));
        create_api_router()
            .with_state(state)
            .layer(middleware::from_fn_with_state(
                rate_limit_state,
                rate_limit_middleware,
            ))
    };

    Router::new()
        .merge(metrics_router)
        .merge(api_router)
        .merge(swagger_ui_router())
        .layer(Extension(jwt))
        .layer(middleware::from_fn(metrics_layer))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, request_timeout))
        .layer(cors_layer())
}

/// OpenAPI 스펙 내보내기 처리.
///
/// `--export-openapi` 플래그 또는 `EXPORT_OPENAPI` 환경변수가 설정된 경우
/// OpenAPI JSON 스펙을 stdout으로 출력하고 종료합니다.
fn handle_export_openapi() -> Result<(), Box<dyn std::error::Error>> {
    use fund_api::openapi::ApiDoc;
    use utoipa::OpenApi as _;

    let export_flag = std::env::args().any(|arg| arg == "--export-openapi");
    let export_env = std::env::var("EXPORT_OPENAPI")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    if export_flag || export_env {
        let json = serde_json::to_string_pretty(&ApiDoc::openapi())?;
        println!("{}", json);
        std::process::exit(0);
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .env 파일 로드 (있는 경우)
    let _ = dotenvy::dotenv();

    handle_export_openapi()?;

    let config = AppConfig::load_default()?;
    init_logging(LogConfig::from(&config.logging))?;

    info!("Starting Fund Portal API server...");

    let metrics_handle = setup_metrics_recorder();
    info!("Prometheus metrics recorder initialized");

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| {
            error!(
                host = %config.server.host,
                port = config.server.port,
                error = %e,
                "소켓 주소 설정이 유효하지 않습니다. FUND__SERVER__HOST, FUND__SERVER__PORT를 확인하세요."
            );
            e
        })?;

    let jwt = JwtConfig::from_env();
    if std::env::var("JWT_SECRET").is_err() {
        warn!("JWT_SECRET not set, using default (INSECURE for development only)");
    }

    // 데이터베이스 (필수)
    let database_url = std::env::var("DATABASE_URL").map_err(|_| {
        error!("DATABASE_URL not set");
        "DATABASE_URL must be set"
    })?;
    let db = Database::connect(&DatabaseConfig::from_settings(database_url, &config.database)).await?;
    db.migrate().await?;
    info!("Database connected and migrated");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let pg_store = PgAccrualStore::new(db.clone());
    let returns = pg_store.returns().clone();
    let store: Arc<dyn AccrualStore> = Arc::new(pg_store);

    let source = select_return_source(&config, returns.clone());
    let scheduler = Arc::new(
        RecalculationScheduler::new(store, source, clock.clone())
            .with_source_timeout(config.accrual.return_source_timeout())
            .with_skip_weekends(config.accrual.skip_weekends),
    );
    let return_cache = Arc::new(CumulativeReturnCache::new(
        Arc::new(returns),
        clock.clone(),
        config.accrual.return_cache_ttl(),
    ));

    let state = Arc::new(
        AppState::new(config, jwt, scheduler, return_cache, clock).with_db_pool(db.pool().clone()),
    );
    info!(
        version = %state.version,
        today = %state.today(),
        "Application state initialized"
    );

    let shutdown_token = CancellationToken::new();

    let app = create_router(state, metrics_handle);

    info!(%addr, "API server listening");
    info!("Swagger UI available at http://{}/swagger-ui", addr);
    info!("Metrics available at http://{}/metrics", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown_token.clone()))
    .await?;

    info!("Server shutdown initiated, cleaning up...");
    shutdown_token.cancel();
    db.pool().close().await;

    info!("Server stopped gracefully");
    Ok(())
}

/// Graceful shutdown 시그널 대기.
///
/// Ctrl+C 또는 SIGTERM 시그널을 수신하면 종료 토큰을 취소합니다.
async fn shutdown_signal(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
        }
    }

    shutdown_token.cancel();
    info!("Shutdown signal propagated");
}
