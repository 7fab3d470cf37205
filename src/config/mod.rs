// Re-export all items from the submodules
mod env_vars;
mod pipeline_config;

// Re-export pipeline config
pub use pipeline_config::{
    BackoffSettings,
    ChannelSettings,
    MultipartSettings,
    PipelineConfig,
    UploadSettings,
    load_or_create_config,
};

// Re-export environment variable functions
pub use env_vars::{
    expand_env_vars,
    normalize_path_for_os,
    resolve_local_path,
};
