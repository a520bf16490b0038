use crate::server::ServerRouter;

mod accounts;
mod groups;
mod posts;
mod users;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .merge(accounts::routes())
        .merge(users::routes())
        .merge(groups::routes())
        .merge(posts::routes())
}
