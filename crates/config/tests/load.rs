use emu_config::AppConfig;
use figment::Jail;
use rust_decimal::Decimal;

#[test]
fn test_load_merges_files_and_env() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "default.toml",
            r#"
app_name = "emulator-test"

[server]
grpc_port = 19090

[account]
id = "acc-1"
initial_balance = "5000"
"#,
        )?;
        jail.create_file(
            "staging.toml",
            r#"
app_env = "staging"

[orderbook]
initial_bid = "10.00"
initial_ask = "10.50"
"#,
        )?;
        jail.set_env("APP_ENV", "staging");
        jail.set_env("EMULATOR_SERVER__HTTP_PORT", "18080");

        let config = AppConfig::load(".").map_err(|e| e.to_string())?;
        assert_eq!(config.app_name, "emulator-test");
        assert_eq!(config.app_env, "staging");
        assert_eq!(config.server.grpc_port, 19090);
        assert_eq!(config.server.http_port, 18080);
        assert_eq!(config.account.id, "acc-1");
        assert_eq!(config.account.initial_balance, Decimal::new(5000, 0));
        assert_eq!(config.orderbook.initial_bid, Some(Decimal::new(1000, 2)));
        // 未覆盖的字段保留默认值
        assert_eq!(config.orderbook.initial_volume, 1000);
        Ok(())
    });
}

#[test]
fn test_load_without_files_uses_defaults() {
    Jail::expect_with(|_jail| {
        let config = AppConfig::load("missing-dir").map_err(|e| e.to_string())?;
        assert_eq!(config.app_name, "broker-emulator");
        assert_eq!(config.server.grpc_port, 9090);
        Ok(())
    });
}

#[test]
fn test_invalid_book_is_rejected() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "default.toml",
            r#"
[orderbook]
initial_bid = "11"
initial_ask = "10"
"#,
        )?;
        assert!(AppConfig::load(".").is_err());
        Ok(())
    });
}
