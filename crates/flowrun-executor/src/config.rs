//! Executor configuration.

use clap::Args;
use flowrun_core::TaskOption;

/// Default address of the local channel agent.
pub const DEFAULT_AGENT_ADDR: &str = "127.0.0.1:8930";

/// Options selecting the task group this executor runs.
#[derive(Debug, Clone, Args)]
pub struct TaskArgs {
    /// Flow context id; -1 disables task mode.
    #[arg(long = "flow-id", default_value_t = -1, allow_negative_numbers = true)]
    pub context_id: i32,

    /// Task group id within the flow; -1 disables task mode.
    #[arg(long = "task-group-id", default_value_t = -1, allow_negative_numbers = true)]
    pub task_group_id: i32,

    /// Job fingerprint prefixed to every channel name.
    #[arg(long = "exe-hash", default_value = "")]
    pub executable_file_hash: String,

    /// Remote input locations as comma-separated `name@host:port`.
    #[arg(long, default_value = "")]
    pub inputs: String,

    /// Capacity of each in-process channel; 0 means minimal buffering.
    #[arg(long, default_value_t = 0)]
    pub channel_buffer_size: usize,
}

impl From<TaskArgs> for TaskOption {
    fn from(args: TaskArgs) -> Self {
        TaskOption::new(args.context_id, args.task_group_id)
            .with_executable_file_hash(args.executable_file_hash)
            .with_inputs(args.inputs)
            .with_channel_buffer_size(args.channel_buffer_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        task: TaskArgs,
    }

    #[test]
    fn test_defaults_disable_task_mode() {
        let cli = TestCli::parse_from(["test"]);
        let option = TaskOption::from(cli.task);
        assert!(!option.is_task_mode());
        assert_eq!(option.executable_file_hash(), "");
        assert_eq!(option.channel_buffer_size(), 0);
    }

    #[test]
    fn test_args_convert_to_option() {
        let cli = TestCli::parse_from([
            "test",
            "--flow-id",
            "3",
            "--task-group-id",
            "1",
            "--exe-hash",
            "abc",
            "--inputs",
            "abc-ct-3-ds-0-shard-0@10.0.0.5:8930",
            "--channel-buffer-size",
            "16",
        ]);
        let option = TaskOption::from(cli.task);

        assert!(option.is_task_mode());
        assert_eq!(option.context_id().get(), 3);
        assert_eq!(option.task_group_id().get(), 1);
        assert_eq!(
            option.input_locations().unwrap().get("abc-ct-3-ds-0-shard-0"),
            Some(&"10.0.0.5:8930".to_string())
        );
        assert_eq!(option.channel_buffer_size(), 16);
    }

    #[test]
    fn test_negative_ids_parse() {
        let cli = TestCli::parse_from(["test", "--flow-id", "-1", "--task-group-id", "-1"]);
        assert_eq!(cli.task.context_id, -1);
    }
}
