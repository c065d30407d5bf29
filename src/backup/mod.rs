pub mod backup_config;
pub mod backup_name;
pub mod dir_ops;
pub mod listing;
pub mod materializer;
pub mod notifications;
pub mod process;
pub mod producer;
pub mod redacted;
pub mod result_error;
pub mod retention;
pub mod rotation;
pub mod run_log;
pub mod tier;
pub mod validate;

macro_rules! function_path {
    () => {
        concat!(module_path!(), "::", function_name!(), " ", file!(), ":", line!())
    };
}

pub(crate) use function_path;
