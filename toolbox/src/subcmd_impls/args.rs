use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "toolbox")]
#[command(about = "时空图谱构建与切片截图的工具集.")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// 子命令。
    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    pub fn run_program(&mut self) -> anyhow::Result<()> {
        match self.command {
            Commands::MakePbmaps(ref mut v) => v.run(),
            Commands::TakeScreenshots(ref mut v) => v.run(),
        }
    }

    /// 日志详细程度：0 为警告，1 为进度，2 为调试信息，3 及以上为全部。
    pub fn verbosity(&self) -> u8 {
        match self.command {
            Commands::MakePbmaps(ref v) => v.verbosity(),
            Commands::TakeScreenshots(_) => 1,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 按配置文件依次生成各通道、各迭代步的形变图像与平均概率图。
    MakePbmaps(crate::subcmd_impls::make_pbmaps::MakePbmaps),
    /// 截取NIfTI图像的二维切片，按窗位窗宽与颜色表保存为图像文件。
    TakeScreenshots(crate::subcmd_impls::take_screenshots::TakeScreenshots),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subcommand_names() {
        let cli = Cli::try_parse_from(["toolbox", "make-pbmaps", "atlas.json", "-i", "1"]).unwrap();
        assert!(matches!(cli.command, Commands::MakePbmaps(_)));
        assert_eq!(cli.verbosity(), 1);

        let cli = Cli::try_parse_from(["toolbox", "take-screenshots", "t2.nii.gz", "out.png"]).unwrap();
        assert!(matches!(cli.command, Commands::TakeScreenshots(_)));
    }

    #[test]
    fn test_missing_subcommand() {
        assert!(Cli::try_parse_from(["toolbox"]).is_err());
        assert!(Cli::try_parse_from(["toolbox", "nii2npy"]).is_err());
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
