use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use sms_core::AppConfig;
use sms_dispatch::app::Application;
use sms_dispatch::common::{init_logging, parse_hex, to_hex, wait_for_shutdown_signal};
use sms_dispatch::shutdown::ShutdownManager;
use sms_dispatcher::MessageSegmenter;
use sms_domain::{CompletionReceiver, CompletionToken, ResultCode, SendRequest};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();

    let config_path = matches.get_one::<String>("config");
    let config = AppConfig::load(config_path.map(String::as_str))
        .with_context(|| format!("加载配置失败: {}", config_path.map_or("默认路径", |p| p.as_str())))?;

    let log_level = matches
        .get_one::<String>("log-level")
        .cloned()
        .unwrap_or_else(|| config.observability.log_level.clone());
    let log_format = matches
        .get_one::<String>("log-format")
        .cloned()
        .unwrap_or_else(|| config.observability.log_format.clone());
    init_logging(&log_level, &log_format)?;

    match matches.subcommand() {
        Some(("serve", _)) => serve(config).await,
        Some(("segment", sub)) => segment(&config, sub),
        Some(("send", sub)) => send(config, sub).await,
        Some(("icc", sub)) => icc(config, sub).await,
        _ => Err(anyhow::anyhow!("未知的子命令")),
    }
}

fn build_cli() -> Command {
    let index_arg = Arg::new("index")
        .long("index")
        .value_name("INDEX")
        .help("槽位索引（从1开始）")
        .value_parser(clap::value_parser!(usize))
        .required(true);
    let status_arg = Arg::new("status")
        .long("status")
        .value_name("STATUS")
        .help("记录状态: 1=已读 3=未读 5=已发送 7=未发送")
        .value_parser(clap::value_parser!(i32))
        .default_value("1");
    let pdu_arg = Arg::new("pdu-hex")
        .long("pdu-hex")
        .value_name("HEX")
        .help("PDU 的十六进制表示")
        .required(true);

    Command::new("sms-dispatch")
        .version(env!("CARGO_PKG_VERSION"))
        .about("短信分发与投递跟踪")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径")
                .global(true),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .global(true),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式")
                .value_parser(["json", "pretty"])
                .global(true),
        )
        .subcommand(Command::new("serve").about("运行后台回收任务直到收到关闭信号"))
        .subcommand(
            Command::new("segment")
                .about("显示文本的分段结果")
                .arg(Arg::new("text").long("text").short('t').required(true)),
        )
        .subcommand(
            Command::new("send")
                .about("经回环传输发送一条短信并等待结果")
                .arg(Arg::new("to").long("to").value_name("ADDRESS").required(true))
                .arg(Arg::new("text").long("text").short('t').required(true))
                .arg(Arg::new("sc").long("sc").value_name("ADDRESS").help("短信中心地址")),
        )
        .subcommand(
            Command::new("icc")
                .about("ICC 短信存储操作")
                .subcommand_required(true)
                .subcommand(Command::new("list").about("列出所有已占用的槽位"))
                .subcommand(
                    Command::new("write")
                        .about("写入一条记录")
                        .arg(pdu_arg.clone())
                        .arg(status_arg.clone())
                        .arg(Arg::new("smsc-hex").long("smsc-hex").value_name("HEX")),
                )
                .subcommand(
                    Command::new("update")
                        .about("更新指定槽位")
                        .arg(index_arg.clone())
                        .arg(status_arg)
                        .arg(pdu_arg.required(false)),
                )
                .subcommand(Command::new("erase").about("擦除指定槽位").arg(index_arg)),
        )
}

async fn serve(config: AppConfig) -> Result<()> {
    info!("启动短信分发服务");
    let app = Application::new(config).await?;
    let shutdown_manager = ShutdownManager::new();
    app.start_background_tasks(&shutdown_manager).await;

    wait_for_shutdown_signal().await;
    info!("收到关闭信号，开始优雅关闭...");

    if !shutdown_manager
        .shutdown_and_wait(Duration::from_secs(30))
        .await
    {
        warn!("后台任务关闭超时，强制退出");
    }
    info!("短信分发服务已退出");
    Ok(())
}

fn segment(config: &AppConfig, matches: &ArgMatches) -> Result<()> {
    let text = required(matches, "text")?;
    let segmenter = MessageSegmenter::new(config.segmentation.clone());
    let parts = segmenter.segment(text)?;

    println!("编码: {:?}，分段数: {}", parts[0].encoding, parts.len());
    for part in &parts {
        println!(
            "[{}/{}] {} 单元: {:?}",
            part.index + 1,
            part.total,
            part.payload.len(),
            part.text.as_deref().unwrap_or_default()
        );
    }
    Ok(())
}

async fn send(config: AppConfig, matches: &ArgMatches) -> Result<()> {
    let destination = required(matches, "to")?;
    let text = required(matches, "text")?;
    let timeout = config.tracking.retirement_timeout();

    let app = Application::new(config).await?;
    let coordinator = app.coordinator();
    let part_count = coordinator.segmenter().segment(text)?.len();

    // 汇总结果只需要一个发送令牌
    let (sent_token, sent_receiver) = CompletionToken::channel();
    let (delivered_tokens, delivered_receivers): (Vec<_>, Vec<_>) =
        (0..part_count).map(|_| CompletionToken::channel()).unzip();

    let mut request =
        SendRequest::text(destination, text).with_tokens(vec![sent_token], delivered_tokens);
    if let Some(sc) = matches.get_one::<String>("sc") {
        request = request.with_sc_address(sc.clone());
    }

    let handle = coordinator.send(request).await?;
    println!(
        "消息 {} 已分发，分段数 {}，通道 {}",
        handle.message_id,
        handle.part_count,
        handle.path.as_str()
    );
    if let Some(message_ref) = handle.message_ref {
        // 回环传输不会有运营商应用回报，直接确认 IP 通道成功
        coordinator.report_outcome(message_ref, true).await;
    }

    let sent = match tokio::time::timeout(timeout, sent_receiver).await {
        Ok(Ok(code)) => code,
        _ => ResultCode::Timeout,
    };
    println!("发送结果: {}", sent);
    for (index, code) in wait_all(delivered_receivers, timeout).await.iter().enumerate() {
        println!("分段 {} 投递结果: {}", index + 1, code);
    }
    Ok(())
}

async fn wait_all(
    receivers: Vec<CompletionReceiver>,
    limit: Duration,
) -> Vec<ResultCode> {
    let mut codes = Vec::with_capacity(receivers.len());
    for receiver in receivers {
        let code = match tokio::time::timeout(limit, receiver).await {
            Ok(Ok(code)) => code,
            _ => ResultCode::Timeout,
        };
        codes.push(code);
    }
    codes
}

async fn icc(config: AppConfig, matches: &ArgMatches) -> Result<()> {
    let app = Application::new(config).await?;
    let coordinator = app.coordinator();

    match matches.subcommand() {
        Some(("list", _)) => {
            let records = coordinator.get_all_messages_from_icc().await?;
            if records.is_empty() {
                println!("ICC 中没有短信");
            }
            for record in records {
                println!("[{}] {} {}", record.index, record.status, to_hex(&record.data));
            }
        }
        Some(("write", sub)) => {
            let pdu = parse_hex(required(sub, "pdu-hex")?)?;
            let smsc = sub
                .get_one::<String>("smsc-hex")
                .map(String::as_str)
                .map(parse_hex)
                .transpose()?;
            let status = status_arg(sub)?;
            let ok = coordinator
                .copy_message_to_icc(smsc.as_deref(), &pdu, status)
                .await?;
            println!("{}", if ok { "写入成功" } else { "写入失败" });
        }
        Some(("update", sub)) => {
            let index = index_arg(sub)?;
            // 状态为 Free 时不需要 PDU
            let pdu_hex = sub.get_one::<String>("pdu-hex").map_or("", String::as_str);
            let pdu = parse_hex(pdu_hex)?;
            let ok = coordinator
                .update_message_on_icc(index, status_arg(sub)?, &pdu)
                .await?;
            println!("{}", if ok { "更新成功" } else { "更新失败" });
        }
        Some(("erase", sub)) => {
            let ok = coordinator.delete_message_from_icc(index_arg(sub)?).await?;
            println!("{}", if ok { "擦除成功" } else { "擦除失败" });
        }
        _ => return Err(anyhow::anyhow!("未知的 icc 子命令")),
    }
    Ok(())
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str> {
    matches
        .get_one::<String>(name)
        .map(String::as_str)
        .ok_or_else(|| anyhow::anyhow!("缺少参数: --{name}"))
}

fn index_arg(matches: &ArgMatches) -> Result<usize> {
    matches
        .get_one::<usize>("index")
        .copied()
        .ok_or_else(|| anyhow::anyhow!("缺少参数: --index"))
}

fn status_arg(matches: &ArgMatches) -> Result<i32> {
    matches
        .get_one::<i32>("status")
        .copied()
        .ok_or_else(|| anyhow::anyhow!("缺少参数: --status"))
}
