//! 주문 상태 머신
//!
//! ```text
//! PENDING_SERVICE --Begin--> IN_SERVICE --CompanionConfirm--> PENDING_SETTLEMENT
//! PENDING_SETTLEMENT --PatientConfirm--> COMPLETED
//! PENDING_SERVICE --Cancel--> CANCELLED
//! ```
//!
//! COMPLETED, CANCELLED는 종료 상태이며 이후 변경되지 않습니다.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identity::Role;

/// 주문 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[repr(i32)]
pub enum OrderStatus {
    /// 서비스 대기
    PendingService = 1,
    /// 서비스 중
    InService = 2,
    /// 정산 대기
    PendingSettlement = 3,
    /// 완료
    Completed = 4,
    /// 취소
    Cancelled = 5,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    pub fn label(self) -> &'static str {
        match self {
            OrderStatus::PendingService => "서비스 대기",
            OrderStatus::InService => "서비스 중",
            OrderStatus::PendingSettlement => "정산 대기",
            OrderStatus::Completed => "완료",
            OrderStatus::Cancelled => "취소",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 주문 전이 이벤트
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderEvent {
    /// 동행인이 서비스 시작
    Begin,
    /// 동행인이 서비스 완료 확인
    CompanionConfirm,
    /// 환자가 완료 확인 (정산 발생)
    PatientConfirm,
    /// 서비스 시작 전 취소
    Cancel,
}

impl OrderEvent {
    pub fn source(self) -> OrderStatus {
        match self {
            OrderEvent::Begin | OrderEvent::Cancel => OrderStatus::PendingService,
            OrderEvent::CompanionConfirm => OrderStatus::InService,
            OrderEvent::PatientConfirm => OrderStatus::PendingSettlement,
        }
    }

    pub fn target(self) -> OrderStatus {
        match self {
            OrderEvent::Begin => OrderStatus::InService,
            OrderEvent::CompanionConfirm => OrderStatus::PendingSettlement,
            OrderEvent::PatientConfirm => OrderStatus::Completed,
            OrderEvent::Cancel => OrderStatus::Cancelled,
        }
    }

    /// 이 이벤트를 일으킬 수 있는 역할인지
    pub fn permits(self, role: Role) -> bool {
        match (self, role) {
            (OrderEvent::Begin, Role::Companion) => true,
            (OrderEvent::CompanionConfirm, Role::Companion) => true,
            (OrderEvent::PatientConfirm, Role::Patient) => true,
            (OrderEvent::Cancel, Role::Patient | Role::Companion) => true,
            _ => false,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            OrderEvent::Begin => "서비스 시작",
            OrderEvent::CompanionConfirm => "서비스 완료 확인",
            OrderEvent::PatientConfirm => "완료 확인",
            OrderEvent::Cancel => "주문 취소",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [OrderStatus; 5] = [
        OrderStatus::PendingService,
        OrderStatus::InService,
        OrderStatus::PendingSettlement,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    const EVENTS: [OrderEvent; 4] = [
        OrderEvent::Begin,
        OrderEvent::CompanionConfirm,
        OrderEvent::PatientConfirm,
        OrderEvent::Cancel,
    ];

    #[test]
    fn test_forward_edges_only() {
        let edges: Vec<_> = EVENTS.iter().map(|e| (e.source(), e.target())).collect();
        assert!(edges.contains(&(OrderStatus::PendingService, OrderStatus::InService)));
        assert!(edges.contains(&(OrderStatus::InService, OrderStatus::PendingSettlement)));
        assert!(edges.contains(&(OrderStatus::PendingSettlement, OrderStatus::Completed)));
        assert!(edges.contains(&(OrderStatus::PendingService, OrderStatus::Cancelled)));

        assert!(!edges.contains(&(OrderStatus::InService, OrderStatus::Cancelled)));
        assert!(!edges.contains(&(OrderStatus::PendingService, OrderStatus::Completed)));
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for status in ALL {
            let has_exit = EVENTS.iter().any(|e| e.source() == status);
            assert_eq!(status.is_terminal(), !has_exit, "{:?}", status);
        }
    }

    #[test]
    fn test_event_roles() {
        assert!(OrderEvent::Begin.permits(Role::Companion));
        assert!(!OrderEvent::Begin.permits(Role::Patient));
        assert!(OrderEvent::PatientConfirm.permits(Role::Patient));
        assert!(!OrderEvent::PatientConfirm.permits(Role::Companion));
        assert!(OrderEvent::Cancel.permits(Role::Patient));
        assert!(OrderEvent::Cancel.permits(Role::Companion));
    }
}
