//! 페이지 조회 요청/응답

use serde::{Deserialize, Serialize};

use crate::config::CoreConfig;
use crate::error::{CoreError, CoreResult};

/// 페이지 요청 (page는 1부터)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

impl PageRequest {
    pub fn new(page: u32, size: u32) -> Self {
        Self { page, size }
    }

    pub fn first(size: u32) -> Self {
        Self::new(1, size)
    }

    /// 설정된 기본 크기의 첫 페이지
    pub fn default_for(config: &CoreConfig) -> Self {
        Self::first(config.default_page_size)
    }

    /// 범위를 검사하고 (LIMIT, OFFSET) 값을 돌려줍니다.
    pub fn limit_offset(&self, max_size: u32) -> CoreResult<(i64, i64)> {
        if self.page == 0 {
            return Err(CoreError::Validation("page는 1 이상이어야 합니다".into()));
        }
        if self.size == 0 || self.size > max_size {
            return Err(CoreError::Validation(format!(
                "size는 1 이상 {} 이하여야 합니다 (요청: {})",
                max_size, self.size
            )));
        }
        let limit = i64::from(self.size);
        Ok((limit, i64::from(self.page - 1) * limit))
    }
}

/// 페이지 조회 결과
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub size: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, request: PageRequest) -> Self {
        Self {
            items,
            total,
            page: request.page,
            size: request.size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_offset() {
        assert_eq!(PageRequest::new(3, 10).limit_offset(100).unwrap(), (10, 20));
        assert!(PageRequest::new(0, 10).limit_offset(100).is_err());
        assert!(PageRequest::new(1, 0).limit_offset(100).is_err());
        assert!(PageRequest::new(1, 101).limit_offset(100).is_err());
    }

    #[test]
    fn test_default_for_uses_configured_size() {
        let config = CoreConfig {
            default_page_size: 25,
            ..CoreConfig::default()
        };
        let request = PageRequest::default_for(&config);
        assert_eq!(request, PageRequest::new(1, 25));
        assert_eq!(request.limit_offset(config.max_page_size).unwrap(), (25, 0));
    }
}
