//! 잔고 재계산 오케스트레이션.
//!
//! `RecalculationScheduler`는 저장소에서 원장과 수익률을 읽어 `AccrualEngine`을 구동하고
//! 결과를 저장합니다. 잔고와 성과 궤적을 쓰는 유일한 경로입니다.
//!
//! - `recompute_one` - 한 클라이언트 전체 재계산 (입금 변경 직후)
//! - `nightly` / `recompute_all` - 실거래 클라이언트 하루치 증분 계산
//! - `recompute_all_full` - 모든 클라이언트 전체 재계산 (관리자)

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use crate::accrual_span;
use crate::domain::{
    AccountUpdate, AccrualOutcome, ClientAccount, DailyPerformanceRecord, Deposit, DepositLedger,
    ReturnSeries,
};
use crate::engine::AccrualEngine;
use crate::error::{FundError, FundResult};
use crate::source::{Clock, FallbackReturnSource, ReturnSource};
use crate::types::return_percent;

// ==================== 저장소 트레이트 ====================

/// 재계산에 필요한 영속 계층.
///
/// 구현체는 `replace_trajectory`와 `upsert_daily`를 각각 하나의 트랜잭션으로 처리해야 합니다.
#[async_trait]
pub trait AccrualStore: Send + Sync {
    /// 클라이언트 계좌를 조회합니다.
    async fn load_account(&self, client_id: Uuid) -> FundResult<Option<ClientAccount>>;

    /// 유효일이 확정된 입금을 (유효일, 삽입 순서) 순으로 조회합니다.
    async fn load_deposits(&self, client_id: Uuid) -> FundResult<Vec<Deposit>>;

    /// 사용 가능한 전체 수익률 시리즈를 조회합니다.
    async fn load_return_series(&self) -> FundResult<ReturnSeries>;

    /// 클라이언트 성과 궤적을 통째로 교체하고 계좌를 갱신합니다.
    async fn replace_trajectory(
        &self,
        client_id: Uuid,
        outcome: &AccrualOutcome,
        update: &AccountUpdate,
    ) -> FundResult<()>;

    /// 실거래 중이고 운용 시작일이 `date` 이하인 클라이언트.
    async fn live_clients(&self, date: NaiveDate) -> FundResult<Vec<Uuid>>;

    /// 반영 입금이 하나 이상 있는 클라이언트.
    async fn clients_with_contributing_deposits(&self) -> FundResult<Vec<Uuid>>;

    /// `date`보다 앞선 가장 최근 성과 기록.
    async fn latest_record_before(
        &self,
        client_id: Uuid,
        date: NaiveDate,
    ) -> FundResult<Option<DailyPerformanceRecord>>;

    /// 하루치 기록을 (client_id, trade_date) 기준으로 upsert 합니다.
    ///
    /// `update`가 `None`이면 계좌는 그대로 둡니다.
    async fn upsert_daily(
        &self,
        record: &DailyPerformanceRecord,
        update: Option<&AccountUpdate>,
    ) -> FundResult<()>;

    /// 실제 소스에서 받은 일일 수익률을 저장합니다.
    async fn save_daily_return(&self, date: NaiveDate, percent: Decimal) -> FundResult<()>;

    /// 기간 내 성과 기록 (날짜순). 경계가 `None`이면 제한 없음.
    async fn performance_range(
        &self,
        client_id: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> FundResult<Vec<DailyPerformanceRecord>>;
}

#[async_trait]
impl<T: AccrualStore + ?Sized> AccrualStore for Arc<T> {
    async fn load_account(&self, client_id: Uuid) -> FundResult<Option<ClientAccount>> {
        (**self).load_account(client_id).await
    }

    async fn load_deposits(&self, client_id: Uuid) -> FundResult<Vec<Deposit>> {
        (**self).load_deposits(client_id).await
    }

    async fn load_return_series(&self) -> FundResult<ReturnSeries> {
        (**self).load_return_series().await
    }

    async fn replace_trajectory(
        &self,
        client_id: Uuid,
        outcome: &AccrualOutcome,
        update: &AccountUpdate,
    ) -> FundResult<()> {
        (**self).replace_trajectory(client_id, outcome, update).await
    }

    async fn live_clients(&self, date: NaiveDate) -> FundResult<Vec<Uuid>> {
        (**self).live_clients(date).await
    }

    async fn clients_with_contributing_deposits(&self) -> FundResult<Vec<Uuid>> {
        (**self).clients_with_contributing_deposits().await
    }

    async fn latest_record_before(
        &self,
        client_id: Uuid,
        date: NaiveDate,
    ) -> FundResult<Option<DailyPerformanceRecord>> {
        (**self).latest_record_before(client_id, date).await
    }

    async fn upsert_daily(
        &self,
        record: &DailyPerformanceRecord,
        update: Option<&AccountUpdate>,
    ) -> FundResult<()> {
        (**self).upsert_daily(record, update).await
    }

    async fn save_daily_return(&self, date: NaiveDate, percent: Decimal) -> FundResult<()> {
        (**self).save_daily_return(date, percent).await
    }

    async fn performance_range(
        &self,
        client_id: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> FundResult<Vec<DailyPerformanceRecord>> {
        (**self).performance_range(client_id, from, to).await
    }
}

// ==================== 클라이언트별 잠금 ====================

/// 클라이언트별 단일 작성자 잠금.
///
/// 같은 클라이언트의 재계산은 직렬화되고 다른 클라이언트끼리는 병렬로 진행됩니다.
/// 아무도 잡고 있지 않은 항목은 다음 획득 때 정리됩니다.
#[derive(Debug, Default)]
pub struct ClientLocks {
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl ClientLocks {
    /// 새 잠금 맵을 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 클라이언트 잠금을 획득합니다.
    pub async fn acquire(&self, client_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // 맵만 참조하는 잠금은 보유자도 대기자도 없음
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(client_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// 맵에 남아 있는 클라이언트 수.
    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }

    /// 맵이 비어 있는지 여부.
    pub async fn is_empty(&self) -> bool {
        self.locks.lock().await.is_empty()
    }
}

// ==================== 실행 결과 ====================

/// 클라이언트 한 명의 처리 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa-support", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ClientRunStatus {
    /// 갱신됨
    Updated,
    /// 건너뜀
    Skipped,
    /// 실패 (배치는 계속 진행)
    Failed,
}

/// 클라이언트별 결과.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa-support", derive(utoipa::ToSchema))]
pub struct ClientRunResult {
    /// 클라이언트 ID
    pub client_id: Uuid,
    /// 처리 상태
    pub status: ClientRunStatus,
    /// 갱신된 잔고
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<Decimal>,
    /// 건너뛴 사유 또는 에러 내용
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ClientRunResult {
    /// 갱신 결과.
    pub fn updated(client_id: Uuid, balance: Decimal) -> Self {
        Self {
            client_id,
            status: ClientRunStatus::Updated,
            balance: Some(balance),
            detail: None,
        }
    }

    /// 건너뜀 결과.
    pub fn skipped(client_id: Uuid, reason: impl Into<String>) -> Self {
        Self {
            client_id,
            status: ClientRunStatus::Skipped,
            balance: None,
            detail: Some(reason.into()),
        }
    }

    /// 실패 결과.
    pub fn failed(client_id: Uuid, error: &FundError) -> Self {
        Self {
            client_id,
            status: ClientRunStatus::Failed,
            balance: None,
            detail: Some(error.to_string()),
        }
    }
}

fn count_status(results: &[ClientRunResult], status: ClientRunStatus) -> usize {
    results.iter().filter(|r| r.status == status).count()
}

/// 야간 배치 결과.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa-support", derive(utoipa::ToSchema))]
pub struct NightlyReport {
    /// 처리 날짜
    pub date: NaiveDate,
    /// 주말이라 전체를 건너뛰었는지
    pub skipped_weekend: bool,
    /// 적용한 수익률 (%)
    pub return_percent: Option<Decimal>,
    /// 수익률이 0%로 대체되었는지
    pub return_fallback: bool,
    /// 클라이언트별 결과
    pub results: Vec<ClientRunResult>,
}

impl NightlyReport {
    /// 갱신된 클라이언트 수.
    pub fn updated(&self) -> usize {
        count_status(&self.results, ClientRunStatus::Updated)
    }

    /// 실패한 클라이언트 수.
    pub fn failed(&self) -> usize {
        count_status(&self.results, ClientRunStatus::Failed)
    }
}

/// 전체 재계산 결과.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa-support", derive(utoipa::ToSchema))]
pub struct BatchReport {
    /// 클라이언트별 결과
    pub results: Vec<ClientRunResult>,
}

impl BatchReport {
    /// 갱신된 클라이언트 수.
    pub fn updated(&self) -> usize {
        count_status(&self.results, ClientRunStatus::Updated)
    }

    /// 실패한 클라이언트 수.
    pub fn failed(&self) -> usize {
        count_status(&self.results, ClientRunStatus::Failed)
    }
}

// ==================== 스케줄러 ====================

/// 재계산 스케줄러.
pub struct RecalculationScheduler {
    store: Arc<dyn AccrualStore>,
    source: FallbackReturnSource<Arc<dyn ReturnSource>>,
    clock: Arc<dyn Clock>,
    engine: AccrualEngine,
    locks: ClientLocks,
    skip_weekends: bool,
}

impl RecalculationScheduler {
    /// 새 스케줄러를 생성합니다.
    ///
    /// 기본값: 수익률 조회 타임아웃 30초, 주말 건너뜀.
    pub fn new(
        store: Arc<dyn AccrualStore>,
        source: Arc<dyn ReturnSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            source: FallbackReturnSource::new(source, Duration::from_secs(30)),
            clock,
            engine: AccrualEngine,
            locks: ClientLocks::new(),
            skip_weekends: true,
        }
    }

    /// 수익률 조회 타임아웃을 설정합니다.
    pub fn with_source_timeout(mut self, timeout: Duration) -> Self {
        let source = self.source.inner().clone();
        self.source = FallbackReturnSource::new(source, timeout);
        self
    }

    /// 주말 건너뜀 여부를 설정합니다.
    pub fn with_skip_weekends(mut self, skip: bool) -> Self {
        self.skip_weekends = skip;
        self
    }

    /// 저장소.
    pub fn store(&self) -> &Arc<dyn AccrualStore> {
        &self.store
    }

    /// 오늘 날짜 (주입된 시계 기준).
    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// 한 클라이언트의 전체 궤적을 재계산하고 교체합니다.
    pub async fn recompute_one(&self, client_id: Uuid) -> FundResult<AccrualOutcome> {
        let started = Instant::now();
        let result = self
            .recompute_one_locked(client_id)
            .instrument(accrual_span!("recompute_one", client_id))
            .await;

        let label = if result.is_ok() { "success" } else { "error" };
        metrics::counter!("accrual_recompute_total", "mode" => "full", "result" => label)
            .increment(1);
        metrics::histogram!("accrual_recompute_duration_seconds", "mode" => "full")
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn recompute_one_locked(&self, client_id: Uuid) -> FundResult<AccrualOutcome> {
        let _guard = self.locks.acquire(client_id).await;

        let account = self
            .store
            .load_account(client_id)
            .await?
            .ok_or_else(|| FundError::client_not_found(client_id))?;
        let ledger = DepositLedger::new(self.store.load_deposits(client_id).await?)?;

        let Some(inception) = account
            .inception_date
            .or_else(|| ledger.first_contributing_date())
        else {
            debug!("반영 입금 없음, 빈 궤적으로 교체");
            let outcome = AccrualOutcome::empty();
            self.store
                .replace_trajectory(client_id, &outcome, &outcome.account_update(None))
                .await?;
            return Ok(outcome);
        };

        let series = self.store.load_return_series().await?;
        let today = self.clock.today();
        let outcome =
            self.engine
                .recompute(client_id, inception, ledger.as_slice(), &series, today)?;

        // 실거래 전에는 운용 시작일을 확정하지 않음 (첫 활성화 때 관리자가 지정)
        let new_inception =
            (account.live_trading_enabled && account.inception_date.is_none()).then_some(inception);
        self.store
            .replace_trajectory(client_id, &outcome, &outcome.account_update(new_inception))
            .await?;

        info!(
            inception = %inception,
            days = outcome.trajectory.len(),
            final_balance = %outcome.final_balance,
            total_return_percent = %outcome.total_return_percent,
            "Client recomputed"
        );
        Ok(outcome)
    }

    /// 오늘 날짜로 야간 증분 계산을 실행합니다.
    pub async fn recompute_all(&self) -> FundResult<NightlyReport> {
        self.nightly(self.clock.today()).await
    }

    /// `date` 하루에 대해 실거래 클라이언트 전체에 증분 계산을 적용합니다.
    ///
    /// 클라이언트 한 명의 실패는 결과 목록에 기록되고 나머지는 계속 처리됩니다.
    /// 같은 날짜로 두 번 실행해도 결과는 같습니다.
    pub async fn nightly(&self, date: NaiveDate) -> FundResult<NightlyReport> {
        let started = Instant::now();

        if self.skip_weekends && matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            info!(date = %date, "주말이므로 야간 재계산 건너뜀");
            return Ok(NightlyReport {
                date,
                skipped_weekend: true,
                return_percent: None,
                return_fallback: false,
                results: Vec::new(),
            });
        }

        let fetch = self.source.fetch(date).await;
        if fetch.is_genuine() {
            self.store.save_daily_return(date, fetch.percent).await?;
        }

        let clients = self.store.live_clients(date).await?;
        info!(
            date = %date,
            return_percent = %fetch.percent,
            fallback = !fetch.is_genuine(),
            clients = clients.len(),
            "야간 재계산 시작"
        );

        let mut results = Vec::with_capacity(clients.len());
        for client_id in clients {
            let result = match self
                .nightly_one(client_id, date, fetch.percent)
                .instrument(accrual_span!("nightly", client_id, date))
                .await
            {
                Ok(result) => result,
                Err(e) => {
                    error!(client_id = %client_id, error = %e, "야간 재계산 실패");
                    ClientRunResult::failed(client_id, &e)
                }
            };
            results.push(result);
        }

        let report = NightlyReport {
            date,
            skipped_weekend: false,
            return_percent: Some(fetch.percent),
            return_fallback: !fetch.is_genuine(),
            results,
        };

        let label = if report.failed() == 0 { "success" } else { "partial" };
        metrics::counter!("accrual_recompute_total", "mode" => "nightly", "result" => label)
            .increment(1);
        metrics::histogram!("accrual_recompute_duration_seconds", "mode" => "nightly")
            .record(started.elapsed().as_secs_f64());

        info!(
            date = %date,
            updated = report.updated(),
            failed = report.failed(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "야간 재계산 완료"
        );
        Ok(report)
    }

    /// 한 클라이언트에 하루치 계산을 적용합니다.
    ///
    /// 기준 잔고는 `date` 이전의 마지막 기록 잔고이며, 그 기록 이후부터 `date`까지의
    /// 반영 입금을 당일 입금으로 더합니다. 현재 잔고 필드는 기준으로 쓰지 않습니다.
    async fn nightly_one(
        &self,
        client_id: Uuid,
        date: NaiveDate,
        percent: Decimal,
    ) -> FundResult<ClientRunResult> {
        let _guard = self.locks.acquire(client_id).await;

        let account = self
            .store
            .load_account(client_id)
            .await?
            .ok_or_else(|| FundError::client_not_found(client_id))?;
        let ledger = DepositLedger::new(self.store.load_deposits(client_id).await?)?;
        let previous = self.store.latest_record_before(client_id, date).await?;

        let (balance, since) = match &previous {
            Some(record) => (record.closing_balance, Some(record.trade_date)),
            None => (Decimal::ZERO, None),
        };
        let deposits_today: Decimal = ledger
            .contributing()
            .filter(|d| d.effective_date <= date && since.map_or(true, |s| d.effective_date > s))
            .map(|d| d.amount)
            .sum();

        if balance + deposits_today == Decimal::ZERO {
            return Ok(ClientRunResult::skipped(client_id, "no contributing balance"));
        }

        let step = AccrualEngine::step(balance, deposits_today, percent);
        let record = step.into_record(client_id, date);

        // 과거 날짜를 다시 돌리는 경우 계좌는 그대로 둔다
        let is_latest = account.last_accrual_date.map_or(true, |last| date >= last);
        let update = is_latest.then(|| {
            let total_deposits: Decimal = ledger
                .contributing()
                .filter(|d| d.effective_date <= date)
                .map(|d| d.amount)
                .sum();
            AccountUpdate {
                current_balance: step.closing_balance,
                total_deposits,
                total_return_percent: return_percent(step.closing_balance, total_deposits),
                last_accrual_date: Some(date),
                inception_date: None,
            }
        });
        if !is_latest {
            warn!(date = %date, "이후 기록이 있는 날짜, 계좌 잔고는 갱신하지 않음");
        }

        self.store.upsert_daily(&record, update.as_ref()).await?;
        debug!(closing_balance = %step.closing_balance, "Daily step applied");

        Ok(ClientRunResult::updated(client_id, step.closing_balance))
    }

    /// 반영 입금이 있는 모든 클라이언트를 전체 재계산합니다.
    pub async fn recompute_all_full(&self) -> FundResult<BatchReport> {
        let clients = self.store.clients_with_contributing_deposits().await?;
        info!(clients = clients.len(), "전체 재계산 시작");

        let mut results = Vec::with_capacity(clients.len());
        for client_id in clients {
            let result = match self.recompute_one(client_id).await {
                Ok(outcome) => ClientRunResult::updated(client_id, outcome.final_balance),
                Err(e) => {
                    error!(client_id = %client_id, error = %e, "전체 재계산 실패");
                    ClientRunResult::failed(client_id, &e)
                }
            };
            results.push(result);
        }

        let report = BatchReport { results };
        info!(
            updated = report.updated(),
            failed = report.failed(),
            "전체 재계산 완료"
        );
        Ok(report)
    }
}

// ==================== 메모리 저장소 ====================

#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryAccrualStore;

#[cfg(any(test, feature = "test-utils"))]
mod memory {
    use super::*;
    use std::collections::{BTreeMap, HashSet};
    use std::sync::Mutex as StdMutex;

    #[derive(Debug, Default)]
    struct Inner {
        accounts: HashMap<Uuid, ClientAccount>,
        deposits: Vec<Deposit>,
        series: ReturnSeries,
        records: BTreeMap<(Uuid, NaiveDate), DailyPerformanceRecord>,
        failing: HashSet<Uuid>,
    }

    /// 테스트용 메모리 저장소.
    #[derive(Debug, Default)]
    pub struct MemoryAccrualStore {
        inner: StdMutex<Inner>,
    }

    impl MemoryAccrualStore {
        /// 빈 저장소.
        pub fn new() -> Self {
            Self::default()
        }

        fn with<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            f(&mut inner)
        }

        /// 계좌를 추가합니다.
        pub fn insert_account(&self, account: ClientAccount) {
            self.with(|s| {
                s.accounts.insert(account.client_id, account);
            });
        }

        /// 입금을 추가합니다.
        pub fn insert_deposit(&self, deposit: Deposit) {
            self.with(|s| {
                let sequence = s.deposits.len() as i64 + 1;
                s.deposits.push(deposit.with_sequence(sequence));
            });
        }

        /// 수익률 시리즈를 교체합니다.
        pub fn set_series(&self, series: ReturnSeries) {
            self.with(|s| s.series = series);
        }

        /// 해당 클라이언트의 저장을 실패시킵니다.
        pub fn fail_client(&self, client_id: Uuid) {
            self.with(|s| {
                s.failing.insert(client_id);
            });
        }

        /// 계좌 조회.
        pub fn account(&self, client_id: Uuid) -> Option<ClientAccount> {
            self.with(|s| s.accounts.get(&client_id).cloned())
        }

        /// 클라이언트 성과 기록 (날짜순).
        pub fn records(&self, client_id: Uuid) -> Vec<DailyPerformanceRecord> {
            self.with(|s| {
                s.records
                    .values()
                    .filter(|r| r.client_id == client_id)
                    .cloned()
                    .collect()
            })
        }

        /// 저장된 일일 수익률.
        pub fn daily_return(&self, date: NaiveDate) -> Option<Decimal> {
            self.with(|s| s.series.daily_return(date))
        }

        fn check(s: &Inner, client_id: Uuid) -> FundResult<()> {
            if s.failing.contains(&client_id) {
                return Err(FundError::Database(format!("write failed for {}", client_id)));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl AccrualStore for MemoryAccrualStore {
        async fn load_account(&self, client_id: Uuid) -> FundResult<Option<ClientAccount>> {
            Ok(self.account(client_id))
        }

        async fn load_deposits(&self, client_id: Uuid) -> FundResult<Vec<Deposit>> {
            self.with(|s| {
                let mut deposits: Vec<Deposit> = s
                    .deposits
                    .iter()
                    .filter(|d| d.client_id == client_id)
                    .cloned()
                    .collect();
                deposits.sort_by_key(|d| (d.effective_date, d.sequence));
                Ok(deposits)
            })
        }

        async fn load_return_series(&self) -> FundResult<ReturnSeries> {
            Ok(self.with(|s| s.series.clone()))
        }

        async fn replace_trajectory(
            &self,
            client_id: Uuid,
            outcome: &AccrualOutcome,
            update: &AccountUpdate,
        ) -> FundResult<()> {
            self.with(|s| {
                Self::check(s, client_id)?;
                s.records.retain(|(id, _), _| *id != client_id);
                for record in &outcome.trajectory {
                    s.records
                        .insert((client_id, record.trade_date), record.clone());
                }
                if let Some(account) = s.accounts.get_mut(&client_id) {
                    account.apply(update);
                }
                Ok(())
            })
        }

        async fn live_clients(&self, date: NaiveDate) -> FundResult<Vec<Uuid>> {
            Ok(self.with(|s| {
                let mut ids: Vec<Uuid> = s
                    .accounts
                    .values()
                    .filter(|a| a.live_trading_enabled && a.inception_date.is_some_and(|d| d <= date))
                    .map(|a| a.client_id)
                    .collect();
                ids.sort();
                ids
            }))
        }

        async fn clients_with_contributing_deposits(&self) -> FundResult<Vec<Uuid>> {
            Ok(self.with(|s| {
                let mut ids: Vec<Uuid> = s
                    .deposits
                    .iter()
                    .filter(|d| d.is_contributing())
                    .map(|d| d.client_id)
                    .collect();
                ids.sort();
                ids.dedup();
                ids
            }))
        }

        async fn latest_record_before(
            &self,
            client_id: Uuid,
            date: NaiveDate,
        ) -> FundResult<Option<DailyPerformanceRecord>> {
            Ok(self.with(|s| {
                s.records
                    .range((client_id, NaiveDate::MIN)..(client_id, date))
                    .next_back()
                    .map(|(_, r)| r.clone())
            }))
        }

        async fn upsert_daily(
            &self,
            record: &DailyPerformanceRecord,
            update: Option<&AccountUpdate>,
        ) -> FundResult<()> {
            self.with(|s| {
                Self::check(s, record.client_id)?;
                s.records
                    .insert((record.client_id, record.trade_date), record.clone());
                if let (Some(update), Some(account)) = (update, s.accounts.get_mut(&record.client_id)) {
                    account.apply(update);
                }
                Ok(())
            })
        }

        async fn save_daily_return(&self, date: NaiveDate, percent: Decimal) -> FundResult<()> {
            self.with(|s| s.series.insert_daily(date, percent));
            Ok(())
        }

        async fn performance_range(
            &self,
            client_id: Uuid,
            from: Option<NaiveDate>,
            to: Option<NaiveDate>,
        ) -> FundResult<Vec<DailyPerformanceRecord>> {
            Ok(self
                .records(client_id)
                .into_iter()
                .filter(|r| from.map_or(true, |f| r.trade_date >= f))
                .filter(|r| to.map_or(true, |t| r.trade_date <= t))
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DepositStatus;
    use crate::source::{FixedClock, StaticReturnSource};
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn scheduler(
        store: Arc<MemoryAccrualStore>,
        source: StaticReturnSource,
        today: NaiveDate,
    ) -> RecalculationScheduler {
        RecalculationScheduler::new(store, Arc::new(source), Arc::new(FixedClock::at_date(today)))
    }

    fn live_client(store: &MemoryAccrualStore, inception: NaiveDate) -> Uuid {
        let client_id = Uuid::new_v4();
        store.insert_account(
            ClientAccount::new(client_id)
                .with_inception(inception)
                .with_live_trading(true),
        );
        client_id
    }

    #[tokio::test]
    async fn test_recompute_one_replaces_trajectory() {
        let store = Arc::new(MemoryAccrualStore::new());
        let client = live_client(&store, date(2024, 1, 1));
        store.insert_deposit(Deposit::new(
            client,
            dec!(100000),
            date(2024, 1, 1),
            DepositStatus::Completed,
        ));
        store.set_series(ReturnSeries::with_daily(vec![
            (date(2024, 1, 2), dec!(1)),
            (date(2024, 1, 3), dec!(-0.5)),
        ]));

        let sched = scheduler(store.clone(), StaticReturnSource::default(), date(2024, 1, 3));
        let outcome = sched.recompute_one(client).await.unwrap();
        assert_eq!(outcome.final_balance, dec!(100495));

        // 두 번 실행해도 같은 결과
        sched.recompute_one(client).await.unwrap();
        let records = store.records(client);
        assert_eq!(records.len(), 3);

        let account = store.account(client).unwrap();
        assert_eq!(account.current_balance, dec!(100495));
        assert_eq!(account.total_return_percent, dec!(0.495));
        assert_eq!(account.last_accrual_date, Some(date(2024, 1, 3)));
    }

    #[tokio::test]
    async fn test_recompute_one_derives_inception_from_first_deposit() {
        let store = Arc::new(MemoryAccrualStore::new());
        let client = Uuid::new_v4();
        store.insert_account(ClientAccount::new(client).with_live_trading(true));
        store.insert_deposit(Deposit::new(
            client,
            dec!(500),
            date(2024, 3, 4),
            DepositStatus::Approved,
        ));

        let sched = scheduler(store.clone(), StaticReturnSource::default(), date(2024, 3, 6));
        sched.recompute_one(client).await.unwrap();

        let account = store.account(client).unwrap();
        assert_eq!(account.inception_date, Some(date(2024, 3, 4)));
        assert_eq!(store.records(client).len(), 3);
    }

    #[tokio::test]
    async fn test_recompute_one_keeps_inception_open_before_live_trading() {
        let store = Arc::new(MemoryAccrualStore::new());
        let client = Uuid::new_v4();
        store.insert_account(ClientAccount::new(client));
        store.insert_deposit(Deposit::new(
            client,
            dec!(500),
            date(2024, 3, 4),
            DepositStatus::Completed,
        ));

        let sched = scheduler(store.clone(), StaticReturnSource::default(), date(2024, 3, 6));
        let outcome = sched.recompute_one(client).await.unwrap();

        // 잔고는 첫 입금일부터 계산되지만 운용 시작일은 비워 둠
        assert_eq!(outcome.trajectory.len(), 3);
        let account = store.account(client).unwrap();
        assert!(!account.live_trading_enabled);
        assert_eq!(account.inception_date, None);
        assert_eq!(account.current_balance, dec!(500));
    }

    #[tokio::test]
    async fn test_recompute_one_clears_last_accrual_date_when_ledger_empties() {
        let store = Arc::new(MemoryAccrualStore::new());
        let client = live_client(&store, date(2024, 1, 1));
        store.insert_deposit(Deposit::new(
            client,
            dec!(1000),
            date(2024, 1, 1),
            DepositStatus::Rejected,
        ));
        let mut account = store.account(client).unwrap();
        account.current_balance = dec!(1000);
        account.last_accrual_date = Some(date(2024, 1, 2));
        store.insert_account(account);

        let sched = scheduler(store.clone(), StaticReturnSource::default(), date(2024, 1, 3));
        let outcome = sched.recompute_one(client).await.unwrap();
        assert!(outcome.trajectory.is_empty());

        let account = store.account(client).unwrap();
        assert_eq!(account.current_balance, Decimal::ZERO);
        assert_eq!(account.last_accrual_date, None);
    }

    #[tokio::test]
    async fn test_recompute_one_unknown_client() {
        let store = Arc::new(MemoryAccrualStore::new());
        let sched = scheduler(store, StaticReturnSource::default(), date(2024, 1, 1));
        let result = sched.recompute_one(Uuid::new_v4()).await;
        assert!(matches!(result, Err(FundError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_nightly_is_idempotent() {
        let store = Arc::new(MemoryAccrualStore::new());
        let client = live_client(&store, date(2024, 1, 1));
        store.insert_deposit(Deposit::new(
            client,
            dec!(1000),
            date(2024, 1, 1),
            DepositStatus::Completed,
        ));

        // 2024-01-02 화요일
        let source = StaticReturnSource::new(vec![(date(2024, 1, 2), dec!(2))]);
        let sched = scheduler(store.clone(), source, date(2024, 1, 2));

        let first = sched.nightly(date(2024, 1, 2)).await.unwrap();
        let second = sched.nightly(date(2024, 1, 2)).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.updated(), 1);

        let account = store.account(client).unwrap();
        assert_eq!(account.current_balance, dec!(1020));
        assert_eq!(store.records(client).len(), 1);
        assert_eq!(store.daily_return(date(2024, 1, 2)), Some(dec!(2)));
    }

    #[tokio::test]
    async fn test_nightly_matches_full_replay() {
        let store = Arc::new(MemoryAccrualStore::new());
        let client = live_client(&store, date(2024, 1, 1));
        store.insert_deposit(Deposit::new(
            client,
            dec!(50000),
            date(2024, 1, 1),
            DepositStatus::Completed,
        ));
        store.insert_deposit(Deposit::new(
            client,
            dec!(20000),
            date(2024, 1, 3),
            DepositStatus::Completed,
        ));

        let returns = vec![
            (date(2024, 1, 1), dec!(0.4)),
            (date(2024, 1, 2), dec!(-1.1)),
            (date(2024, 1, 3), dec!(0.75)),
            (date(2024, 1, 4), dec!(0.2)),
        ];
        let source = StaticReturnSource::new(returns.clone());
        let sched = scheduler(store.clone(), source, date(2024, 1, 4)).with_skip_weekends(false);
        for day in 1..=4 {
            sched.nightly(date(2024, 1, day)).await.unwrap();
        }
        let incremental = store.account(client).unwrap().current_balance;

        let outcome = sched.recompute_one(client).await.unwrap();
        assert_eq!(outcome.final_balance, incremental);
    }

    #[tokio::test]
    async fn test_nightly_isolates_client_failures() {
        let store = Arc::new(MemoryAccrualStore::new());
        let good = live_client(&store, date(2024, 1, 1));
        let bad = live_client(&store, date(2024, 1, 1));
        for client in [good, bad] {
            store.insert_deposit(Deposit::new(
                client,
                dec!(100),
                date(2024, 1, 1),
                DepositStatus::Completed,
            ));
        }
        store.fail_client(bad);

        let sched = scheduler(store.clone(), StaticReturnSource::default(), date(2024, 1, 2));
        let report = sched.nightly(date(2024, 1, 2)).await.unwrap();

        assert_eq!(report.updated(), 1);
        assert_eq!(report.failed(), 1);
        assert!(report.return_fallback);
        assert_eq!(report.return_percent, Some(Decimal::ZERO));
        // 대체값은 저장하지 않음
        assert_eq!(store.daily_return(date(2024, 1, 2)), None);
        assert_eq!(store.account(good).unwrap().current_balance, dec!(100));
    }

    #[tokio::test]
    async fn test_nightly_skips_weekend() {
        let store = Arc::new(MemoryAccrualStore::new());
        let source = StaticReturnSource::default();
        let sched = scheduler(store, source, date(2024, 1, 6));

        // 2024-01-06 토요일
        let report = sched.nightly(date(2024, 1, 6)).await.unwrap();
        assert!(report.skipped_weekend);
        assert!(report.results.is_empty());
    }

    #[tokio::test]
    async fn test_recompute_all_full_counts() {
        let store = Arc::new(MemoryAccrualStore::new());
        let a = live_client(&store, date(2024, 1, 1));
        let b = live_client(&store, date(2024, 1, 1));
        let idle = live_client(&store, date(2024, 1, 1));
        store.insert_deposit(Deposit::new(a, dec!(10), date(2024, 1, 1), DepositStatus::Completed));
        store.insert_deposit(Deposit::new(b, dec!(20), date(2024, 1, 1), DepositStatus::Approved));
        store.insert_deposit(Deposit::new(idle, dec!(30), date(2024, 1, 1), DepositStatus::Pending));
        store.fail_client(b);

        let sched = scheduler(store, StaticReturnSource::default(), date(2024, 1, 2));
        let report = sched.recompute_all_full().await.unwrap();
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.updated(), 1);
        assert_eq!(report.failed(), 1);
    }

    #[tokio::test]
    async fn test_client_locks_serialize_same_client() {
        let locks = Arc::new(ClientLocks::new());
        let client = Uuid::new_v4();

        let guard = locks.acquire(client).await;
        let other = locks.clone();
        let pending = tokio::spawn(async move {
            let _g = other.acquire(client).await;
        });

        tokio::task::yield_now().await;
        assert!(!pending.is_finished());

        // 다른 클라이언트는 막히지 않음
        let _free = locks.acquire(Uuid::new_v4()).await;

        drop(guard);
        pending.await.unwrap();
    }

    #[tokio::test]
    async fn test_client_locks_prune_released_entries() {
        let locks = ClientLocks::new();

        for _ in 0..3 {
            let _guard = locks.acquire(Uuid::new_v4()).await;
        }
        let held = locks.acquire(Uuid::new_v4()).await;
        // 이전 세 항목은 해제되어 정리됨
        assert_eq!(locks.len().await, 1);

        drop(held);
        let _next = locks.acquire(Uuid::new_v4()).await;
        assert_eq!(locks.len().await, 1);
    }
}
