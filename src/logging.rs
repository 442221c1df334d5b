use time::UtcOffset;
use time::macros::format_description;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::DynError;

/// 初始化 tracing 日志，`log` 宏的输出也会经过这里
///
/// 未设置 `RUST_LOG` 时，`crate_name` 和本库输出 debug 级别，其余为 info。
/// 需要在 tokio runtime 启动其他线程之前调用，否则拿不到本地时区。
pub fn init(crate_name: &str) -> Result<(), DynError> {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    let timer = OffsetTime::new(offset, format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"));
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(crate_name).into()))
        .with(tracing_subscriber::fmt::layer().with_thread_ids(true).with_ansi(true).with_timer(timer))
        .try_init()?;
    Ok(())
}

fn default_filter(crate_name: &str) -> String {
    let lib = env!("CARGO_CRATE_NAME");
    if crate_name == lib {
        format!("info,{lib}=debug")
    } else {
        format!("info,{crate_name}=debug,{lib}=debug")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert_eq!(default_filter("httpprom"), "info,httpprom=debug");
        assert_eq!(default_filter("httpprom_demo"), "info,httpprom_demo=debug,httpprom=debug");
    }
}
