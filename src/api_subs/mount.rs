use actix_web::web;

use crate::api_subs::routes;

pub fn mount_subs() -> actix_web::Scope {
    web::scope("/sub")
        .service(routes::manage::post_manage)
        .service(routes::manage::get_current)
}
