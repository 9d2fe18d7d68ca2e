use actix_web::web;

use crate::api_pay::routes;

pub fn mount_pay() -> actix_web::Scope {
    web::scope("/pay").service(routes::checkout::post_checkout)
}
pub fn mount_webhook() -> actix_web::Scope {
    web::scope("/pay").service(routes::webhook::post_webhook)
}
