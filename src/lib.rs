// Payments and gated-content backend for the academy platform.

// Checkout + webhook reconciliation module
pub mod api_pay {
    pub mod routes {
        pub mod checkout;
        pub mod webhook;
    }

    pub mod services {
        pub mod checkout;
        pub mod webhook;
    }

    pub mod dtos {
        pub mod checkout;
    }

    pub mod mount;
}

// Subscription lifecycle module
pub mod api_subs {
    pub mod routes {
        pub mod manage;
    }

    pub mod services {
        pub mod lifecycle;
    }

    pub mod dtos {
        pub mod manage;
    }

    pub mod mount;
}

// Video access + streaming token module
pub mod api_media {
    pub mod routes {
        pub mod token;
    }

    pub mod services {
        pub mod access;
        pub mod stream;
    }

    pub mod dtos {
        pub mod token;
    }

    pub mod mount;
}

// Auth module
pub mod auth {
    pub mod middleware {
        pub mod auth;
    }

    // Re-export auth middleware
    pub use middleware::auth::AuthMiddleware;
}

// Common utilities module
pub mod common {
    pub mod env_config;
    pub mod error;
    pub mod http;
    pub mod jwt;
    pub mod stripe;
}

// Database module
pub mod db {
    pub mod catalog;
    pub mod checkout;
    pub mod log;
    pub mod notification;
    pub mod order;
    pub mod payment;
    pub mod purchase;
    pub mod rate_limit;
    pub mod refund;
    pub mod subscription;
    pub mod user;

    pub mod models;

    mod setup;
    pub use setup::setup;
}

// Record-store-backed rate limiter
pub mod limiter;

// Logger module
pub mod logger;

// Re-export commonly used items for convenience
pub use common::error::AppError;
pub use common::http::Success;
pub use common::jwt::Claims;
