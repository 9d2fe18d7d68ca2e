use actix_web::web;

use crate::api_media::routes;

pub fn mount_media() -> actix_web::Scope {
    web::scope("/media").service(routes::token::post_stream_token)
}
