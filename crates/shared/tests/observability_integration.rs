//! 可观测性模块集成测试
//!
//! 验证指标记录函数、请求 ID 包装类型和配置默认值的行为。
//! 指标记录在未安装 recorder 时为 no-op，因此这些测试不依赖外部服务。

/// 指标记录函数测试
mod metrics_tests {
    use campus_shared::observability::metrics::{
        record_http_request, record_login, record_ping_sent, record_push_delivery,
        record_registration, set_worker_last_run,
    };

    #[test]
    fn test_record_http_request() {
        record_http_request("GET", "/api/posts", 200, 0.012);
        record_http_request("POST", "/api/posts", 201, 0.12);
        record_http_request("PUT", "/api/accounts/me", 200, 0.08);
        record_http_request("DELETE", "/api/posts/1", 204, 0.03);
    }

    #[test]
    fn test_record_http_request_error_statuses() {
        record_http_request("POST", "/api/auth/login", 401, 0.01);
        record_http_request("GET", "/api/accounts/999", 404, 0.005);
        record_http_request("POST", "/api/network/pings", 409, 0.02);
        record_http_request("GET", "/api/posts", 500, 1.5);
    }

    #[test]
    fn test_record_auth_metrics() {
        record_login();
        record_registration();
    }

    #[test]
    fn test_record_ping_sent() {
        record_ping_sent();
    }

    #[test]
    fn test_record_push_delivery() {
        record_push_delivery(true);
        record_push_delivery(false);
    }

    #[test]
    fn test_set_worker_last_run() {
        set_worker_last_run("push_worker");
    }

    #[test]
    fn test_extreme_values_do_not_panic() {
        record_http_request("GET", "/api/search", 200, 0.0);
        record_http_request("GET", "/api/search", 200, 3600.0);
        record_http_request("", "", 0, -1.0);
    }
}

/// 请求 ID 包装类型测试
mod request_id_tests {
    use campus_shared::observability::middleware::RequestId;

    #[test]
    fn test_request_id_as_str() {
        let id = RequestId("req-abc-123".to_string());
        assert_eq!(id.as_str(), "req-abc-123");
    }

    #[test]
    fn test_request_id_clone() {
        let id = RequestId("550e8400-e29b-41d4-a716-446655440000".to_string());
        let cloned = id.clone();
        assert_eq!(id.as_str(), cloned.as_str());
    }
}

/// 可观测性配置测试
mod config_tests {
    use campus_shared::config::ObservabilityConfig;

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, "pretty");
        assert!(config.metrics_enabled);
        assert!(config.metrics_port > 0);
    }
}

/// Guard 生命周期测试
mod guard_tests {
    use campus_shared::observability::ObservabilityGuard;

    #[test]
    fn test_empty_guard_drop() {
        // 空 Guard 在 drop 时不应 panic
        let guard = ObservabilityGuard::empty();
        drop(guard);
    }
}

/// 缓存键格式测试
mod cache_key_tests {
    use campus_shared::cache::CacheKey;

    #[test]
    fn test_cache_key_formats() {
        assert_eq!(CacheKey::session(42), "auth:session:42");
        assert_eq!(CacheKey::profile_entity("experience", 7), "profile:experience:7");
        assert_eq!(CacheKey::about(7), "profile:about:7");
        assert_eq!(CacheKey::public_profile(7), "profile:public:7");
    }

    #[test]
    fn test_rate_limit_key_includes_window() {
        let key = CacheKey::rate_limit("42:write", 1700000000);
        assert!(key.contains("42:write"));
        assert!(key.contains("1700000000"));
    }
}
