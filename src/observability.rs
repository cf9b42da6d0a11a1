//! 学習・予測イベントの構造化ログ出力。
//!
//! ライブラリ自体はサブスクライバを設定しない。`replay_hierarchy` などの
//! 実行ファイルが起動時に [`init`] を一度呼ぶ。

use anyhow::{Error, Result};
use once_cell::sync::OnceCell;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// `RUST_LOG` 未設定時のフィルタ。
const DEFAULT_FILTER: &str = "info";

/// Tracing サブスクライバを一度だけ初期化する。
///
/// `RUST_LOG` が未設定なら `info` で、JSON 形式の fmt レイヤーに出力する。
/// 2回目以降の呼び出しは何もしない。
///
/// # Errors
/// サブスクライバの初期化に失敗した場合はエラーを返す。
pub fn init() -> Result<()> {
    TRACING_INIT.get_or_try_init(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        let fmt_layer = tracing_subscriber::fmt::layer().with_target(false).json();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e: tracing_subscriber::util::TryInitError| Error::msg(e.to_string()))?;

        info!(default_filter = DEFAULT_FILTER, "tracing initialized");
        Ok::<(), Error>(())
    })?;
    Ok(())
}
