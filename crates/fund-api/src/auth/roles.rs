//! 사용자 역할.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// 사용자 역할.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// 관리자 - 입금 승인, 재계산, 전체 티켓 관리
    Admin,
    /// 클라이언트 - 본인 계좌만 접근
    Client,
}

impl Role {
    /// 데이터베이스 저장 값.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Client => "client",
        }
    }

    /// 역할의 우선순위 레벨 반환 (높을수록 더 많은 권한).
    pub fn level(&self) -> u8 {
        match self {
            Role::Admin => 100,
            Role::Client => 10,
        }
    }

    /// 문자열에서 역할 파싱.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "client" => Some(Role::Client),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("admin"), Some(Role::Admin));
        assert_eq!(Role::parse("CLIENT"), Some(Role::Client));
        assert_eq!(Role::parse("viewer"), None);
    }

    #[test]
    fn test_role_serialization() {
        let json = serde_json::to_string(&Role::Admin).unwrap();
        assert_eq!(json, "\"admin\"");
        assert!(Role::Admin.level() > Role::Client.level());
    }
}
