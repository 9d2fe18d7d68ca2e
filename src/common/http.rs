use actix_web::{HttpResponse, Responder};
use serde::Serialize;

use super::error::Res;

/// Shorthand constructors for successful JSON responses.
pub struct Success;

impl Success {
    pub fn ok<T: Serialize>(body: T) -> Res<impl Responder> {
        Result::Ok(HttpResponse::Ok().json(body))
    }

    pub fn created<T: Serialize>(body: T) -> Res<impl Responder> {
        Result::Ok(HttpResponse::Created().json(body))
    }
}
