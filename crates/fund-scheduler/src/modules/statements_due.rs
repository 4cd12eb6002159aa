//! 반기 명세서 발급 대상 확인.
//!
//! 유예일(기본 1월 5일 / 7월 5일)에 새로 열리는 반기 명세서와
//! 그 명세서를 받을 클라이언트를 찾습니다.

use std::time::Instant;

use chrono::NaiveDate;
use fund_core::{AccrualStore, DepositLedger, GracePolicy, StatementPeriod};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{Result, RunStats};

/// 발급 가능해진 명세서 한 건.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueStatement {
    pub client_id: Uuid,
    pub period: StatementPeriod,
}

/// `date`에 유예일이 도래하는 반기 기간.
///
/// 유예 정책에 따라 직전 두 반기 중 유예일이 정확히 `date`인 것만 반환합니다.
pub fn periods_due_on(date: NaiveDate, policy: &GracePolicy) -> Result<Vec<StatementPeriod>> {
    let previous = StatementPeriod::containing(date)?.previous()?;
    let before = previous.previous()?;
    Ok([previous, before]
        .into_iter()
        .filter(|p| p.grace_date(policy) == Some(date))
        .collect())
}

/// `date`에 명세서가 열리는 클라이언트 목록.
///
/// 기간 안에 완료 입금이 하나 이상 있는 클라이언트만 포함합니다.
/// 원장을 읽지 못한 클라이언트는 에러로 집계하고 계속 진행합니다.
pub async fn find_due_statements(
    store: &dyn AccrualStore,
    date: NaiveDate,
    policy: &GracePolicy,
) -> Result<(Vec<DueStatement>, RunStats)> {
    let start = Instant::now();
    let periods = periods_due_on(date, policy)?;
    if periods.is_empty() {
        debug!(date = %date, "오늘 열리는 명세서 기간 없음");
        return Ok((Vec::new(), RunStats {
            elapsed: start.elapsed(),
            ..Default::default()
        }));
    }

    let clients = store.clients_with_contributing_deposits().await?;
    let mut stats = RunStats {
        total: clients.len(),
        ..Default::default()
    };
    let mut due = Vec::new();

    for client_id in clients {
        let ledger = match store.load_deposits(client_id).await {
            Ok(deposits) => match DepositLedger::from_unsorted(deposits) {
                Ok(ledger) => ledger,
                Err(e) => {
                    warn!(client_id = %client_id, error = %e, "원장 검증 실패");
                    stats.errors += 1;
                    continue;
                }
            },
            Err(e) => {
                warn!(client_id = %client_id, error = %e, "입금 조회 실패");
                stats.errors += 1;
                continue;
            }
        };

        let mut matched = false;
        for period in &periods {
            if ledger.has_completed_within(period.start, period.end) {
                info!(client_id = %client_id, period = %period, "명세서 발급 가능");
                due.push(DueStatement {
                    client_id,
                    period: *period,
                });
                matched = true;
            }
        }
        if matched {
            stats.success += 1;
        } else {
            stats.skipped += 1;
        }
    }

    stats.elapsed = start.elapsed();
    Ok((due, stats))
}
