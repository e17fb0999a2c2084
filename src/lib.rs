pub mod graphcms;
pub mod html;
pub mod migrate;
pub mod records;
pub mod retry;

pub mod util {
    pub mod env;
}
