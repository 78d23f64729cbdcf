use anyhow::{anyhow, Context, Result};
use std::sync::Arc;

use reedline::{DefaultPrompt, DefaultPromptSegment, Reedline, Signal};

use crate::agent::{ModelBackend, OllamaClient};
use crate::config::Config;
use crate::session::{RolePlaying, RolePlayingOptions, TurnRecord};
use crate::tools::{FunctionRegistry, RolePlayingFunction};

/// 打印帮助信息
fn print_help() {
    println!("🐪 duet - 双 Agent 角色扮演");
    println!();
    println!("用法：duet <命令> [参数]");
    println!();
    println!("命令:");
    println!("  run             开始一次角色扮演");
    println!("  onboard         生成默认配置文件");
    println!("  help            显示此帮助信息");
    println!();
    println!("run 参数:");
    println!("  --task <文本>       任务（缺省时交互输入）");
    println!("  --assistant <角色>  assistant 角色名");
    println!("  --user <角色>       user 角色名");
    println!("  --turns <N>         最大轮数");
    println!("  --language <语言>   输出语言");
    println!("  --specify           先细化任务");
    println!("  --functions         允许调用 role_playing_function");
    println!("  --json              每轮输出一行 JSON");
    println!();
    println!("示例:");
    println!("  duet run --task \"Develop a trading bot for the stock market\"");
    println!("  duet run --assistant \"Math Student\" --user \"Math Student\" --functions");
}

/// run 命令的附加选项
#[derive(Debug, Default, PartialEq)]
struct RunFlags {
    json: bool,
}

/// 解析 run 参数，直接写入配置
fn parse_run_args(args: &[String], config: &mut Config) -> Result<RunFlags> {
    let mut flags = RunFlags::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        let flag = arg.as_str();
        let mut value = |name: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| anyhow!("{} 需要一个参数", name))
        };

        match flag {
            "--task" | "-t" => config.session.task_prompt = value(flag)?,
            "--assistant" => config.session.assistant_role_name = value(flag)?,
            "--user" => config.session.user_role_name = value(flag)?,
            "--turns" | "-n" => {
                let raw = value(flag)?;
                config.session.chat_turn_limit = raw
                    .parse()
                    .with_context(|| format!("无效的轮数：{}", raw))?;
            }
            "--language" | "-l" => config.session.output_language = Some(value(flag)?),
            "--model" | "-m" => config.agent.model = value(flag)?,
            "--specify" => config.session.with_task_specify = true,
            "--functions" => config.session.with_functions = true,
            "--json" => flags.json = true,
            other => return Err(anyhow!("未知参数：{}", other)),
        }
    }

    Ok(flags)
}

/// 没有给出任务时，交互读取一行
fn read_task() -> Result<String> {
    let mut line_editor = Reedline::create();
    let prompt = DefaultPrompt::new(
        DefaultPromptSegment::Basic("任务".to_string()),
        DefaultPromptSegment::Empty,
    );

    match line_editor.read_line(&prompt)? {
        Signal::Success(buffer) => Ok(buffer.trim().to_string()),
        Signal::CtrlC | Signal::CtrlD => Err(anyhow!("已取消")),
    }
}

fn render_turn(record: &TurnRecord, json: bool) {
    if json {
        match serde_json::to_string(record) {
            Ok(line) => println!("{}", line),
            Err(e) => eprintln!("❌ 序列化失败：{}", e),
        }
        return;
    }

    if record.assistant.terminated {
        println!(
            "🛑 AI Assistant 终止，原因：{}",
            record.assistant.termination_reasons().join(", ")
        );
        return;
    }
    if record.user.terminated {
        println!(
            "🛑 AI User 终止，原因：{}",
            record.user.termination_reasons().join(", ")
        );
        return;
    }

    println!("── 第 {} 轮 ──", record.turn);
    println!("🧑 AI User ({}):\n\n{}\n", record.user.message.role_name(), record.user.message.content());
    println!(
        "🤖 AI Assistant ({}):\n\n{}\n",
        record.assistant.message.role_name(),
        record.assistant.message.content()
    );
}

/// Run 命令 - 执行一次角色扮演
async fn run_role_play(args: &[String]) -> Result<()> {
    let mut config = Config::load_default()?;
    let flags = parse_run_args(args, &mut config)?;

    if config.session.task_prompt.trim().is_empty() {
        config.session.task_prompt = read_task()?;
    }

    let backend: Arc<dyn ModelBackend> = Arc::new(OllamaClient::new());

    let mut options = RolePlayingOptions::new(config.session.clone(), config.agent.clone());
    if config.session.with_functions {
        let bridge = RolePlayingFunction::new(backend.clone(), config.agent.clone(), config.bridge.clone());
        options = options.with_functions(Arc::new(FunctionRegistry::new().with(Arc::new(bridge))));
    }

    let mut session = RolePlaying::create(options, backend)
        .await
        .context("创建角色扮演会话失败")?;

    if !flags.json {
        println!("🤖 模型：{}", config.agent.model);
        println!("📝 AI Assistant 系统提示:\n{}\n", session.assistant_sys_msg().content());
        println!("📝 AI User 系统提示:\n{}\n", session.user_sys_msg().content());
        println!("🎯 原始任务:\n{}\n", session.original_task_prompt());
        if let Some(specified) = session.specified_task_prompt() {
            println!("🎯 细化后的任务:\n{}\n", specified);
        }
    }

    let json = flags.json;
    let outcome = session
        .run(|record| render_turn(record, json))
        .await
        .context("角色扮演过程中模型调用失败")?;

    if json {
        println!("{}", serde_json::json!({ "status": outcome.status, "turn_count": outcome.turn_count }));
    } else {
        println!("✅ 会话结束：{}（共 {} 轮）", outcome.status, outcome.turn_count);
    }

    Ok(())
}

/// Onboard 命令 - 写入默认配置
fn run_onboard() -> Result<()> {
    let path = Config::default_path();
    if path.exists() {
        println!("ℹ️ 配置已存在：{}", path.display());
        return Ok(());
    }

    Config::default()
        .save(&path)
        .context("保存配置文件失败")?;
    println!("✅ 保存配置：{}", path.display());
    println!("编辑该文件设置模型、角色和轮数，然后运行 'duet run'");
    Ok(())
}

/// 主入口函数
pub async fn run_cli() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    let command = args.get(1).map(|s| s.to_lowercase()).unwrap_or_else(|| "help".into());
    let rest = args.get(2..).unwrap_or(&[]);

    match command.as_str() {
        "run" | "r" => run_role_play(rest).await,
        "onboard" => run_onboard(),
        "help" | "-h" | "--help" | "h" => {
            print_help();
            Ok(())
        }
        _ => {
            eprintln!("❌ 未知命令：{}", command);
            eprintln!();
            eprintln!("运行 'duet help' 查看帮助信息");
            std::process::exit(1);
        }
    }
}
