use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand};

use crate::commands::{
    ClearCacheCommand, CompletionsCommand, ConfigureCommand, SamlCommand, SpecificCommand,
};

#[derive(Debug, Clone, Parser)]
#[command(name = "aws-cli-auth", version, about = "Exchange SAML or AWS SSO logins for cached AWS credentials", long_about = None, arg_required_else_help = true)]
pub struct Cli {
    #[arg(
        short = 'p',
        long,
        global = true,
        default_value = "default",
        help = "AWS profile holding aws-cli-auth settings"
    )]
    pub profile: String,

    #[arg(short = 'v', long, global = true, action = ArgAction::Count, help = "Increase verbosity (-v info, -vv debug, -vvv trace)")]
    pub verbose: u8,

    #[command(flatten)]
    pub exchange: ExchangeArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options every credential exchange understands
#[derive(Debug, Clone, Default, Args)]
pub struct ExchangeArgs {
    #[arg(
        short = 'r',
        long,
        global = true,
        help = "Role to assume: an IAM role ARN, or ACCOUNT_ID:ROLE_NAME with --is-sso"
    )]
    pub role: Option<String>,

    #[arg(
        long,
        global = true,
        value_delimiter = ',',
        help = "Roles assumed after the primary role, in the order given"
    )]
    pub role_chain: Vec<String>,

    #[arg(
        short = 's',
        long,
        global = true,
        help = "Write credentials to the AWS credentials file instead of stdout"
    )]
    pub store_profile: bool,

    #[arg(
        long,
        global = true,
        help = "Credentials file section written with --store-profile"
    )]
    pub cfg_section: Option<String>,

    #[arg(
        short = 'd',
        long,
        global = true,
        help = "Session duration in seconds [900-43200]"
    )]
    pub max_duration: Option<i32>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    #[command(about = "Log in through a SAML IdP or the AWS SSO portal in a browser")]
    Saml(SamlCommand),
    #[command(about = "Use a specific non-interactive credential provider [WEB_ID]")]
    Specific(SpecificCommand),
    #[command(about = "Remove every cached credential")]
    ClearCache(ClearCacheCommand),
    #[command(about = "Configure default IdP and session settings for a profile")]
    Configure(ConfigureCommand),
    #[command(about = "Generate shell completion scripts for aws-cli-auth")]
    Completions(CompletionsCommand),
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let profile = self.profile;
        let exchange = self.exchange;

        match self.command {
            Commands::Saml(cmd) => cmd.execute(&profile, &exchange).await,
            Commands::Specific(cmd) => cmd.execute(&profile, &exchange).await,
            Commands::ClearCache(cmd) => cmd.execute(&profile).await,
            Commands::Configure(cmd) => cmd.execute(&profile).await,
            Commands::Completions(cmd) => {
                cmd.execute();
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::specific::Method;
    use clap::{CommandFactory, error::ErrorKind};

    #[test]
    fn test_profile_default_value() {
        let cli = Cli::try_parse_from(["aws-cli-auth", "clear-cache"]).unwrap();
        assert_eq!(cli.profile, "default");
    }

    #[test]
    fn test_profile_custom_value() {
        let cli =
            Cli::try_parse_from(["aws-cli-auth", "--profile", "production", "configure"]).unwrap();
        assert_eq!(cli.profile, "production");
    }

    #[test]
    fn test_profile_short_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["aws-cli-auth", "configure", "-p", "dev"]).unwrap();
        assert_eq!(cli.profile, "dev");
    }

    #[test]
    fn test_saml_command_parsing() {
        let cli = Cli::try_parse_from([
            "aws-cli-auth",
            "saml",
            "--provider",
            "https://idp.example.com/start",
            "--principal",
            "arn:aws:iam::1:saml-provider/Corp",
            "-r",
            "arn:aws:iam::1:role/Admin",
            "--reload-before",
            "120",
            "-d",
            "3600",
        ])
        .unwrap();

        assert_eq!(
            cli.exchange.role.as_deref(),
            Some("arn:aws:iam::1:role/Admin")
        );
        assert_eq!(cli.exchange.max_duration, Some(3600));
        match cli.command {
            Commands::Saml(cmd) => {
                assert_eq!(
                    cmd.provider.as_deref(),
                    Some("https://idp.example.com/start")
                );
                assert_eq!(
                    cmd.principal.as_deref(),
                    Some("arn:aws:iam::1:saml-provider/Corp")
                );
                assert_eq!(cmd.reload_before, Some(120));
                assert!(!cmd.is_sso);
            }
            _ => panic!("Expected Saml command"),
        }
    }

    #[test]
    fn test_saml_sso_parsing() {
        let cli = Cli::try_parse_from([
            "aws-cli-auth",
            "saml",
            "--is-sso",
            "--sso-region",
            "us-east-1",
            "--role",
            "123456789012:PowerUser",
        ])
        .unwrap();

        match cli.command {
            Commands::Saml(cmd) => {
                assert!(cmd.is_sso);
                assert_eq!(cmd.sso_region.as_deref(), Some("us-east-1"));
            }
            _ => panic!("Expected Saml command"),
        }
    }

    #[test]
    fn test_role_chain_comma_separated() {
        let cli = Cli::try_parse_from([
            "aws-cli-auth",
            "saml",
            "--role-chain",
            "arn:aws:iam::1:role/A,arn:aws:iam::2:role/B",
        ])
        .unwrap();

        assert_eq!(
            cli.exchange.role_chain,
            vec!["arn:aws:iam::1:role/A", "arn:aws:iam::2:role/B"]
        );
    }

    #[test]
    fn test_store_profile_flags() {
        let cli = Cli::try_parse_from([
            "aws-cli-auth",
            "-s",
            "--cfg-section",
            "dev",
            "saml",
        ])
        .unwrap();

        assert!(cli.exchange.store_profile);
        assert_eq!(cli.exchange.cfg_section.as_deref(), Some("dev"));
    }

    #[test]
    fn test_specific_command_parsing() {
        let cli = Cli::try_parse_from(["aws-cli-auth", "specific", "--method", "WEB_ID"]).unwrap();
        match cli.command {
            Commands::Specific(cmd) => assert_eq!(cmd.method, Method::WebId),
            _ => panic!("Expected Specific command"),
        }

        let cli = Cli::try_parse_from(["aws-cli-auth", "specific"]).unwrap();
        assert!(matches!(cli.command, Commands::Specific(_)));
    }

    #[test]
    fn test_specific_unknown_method_fails() {
        let result = Cli::try_parse_from(["aws-cli-auth", "specific", "--method", "IMDS"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_clear_cache_command_parsing() {
        let cli = Cli::try_parse_from(["aws-cli-auth", "clear-cache", "--force"]).unwrap();
        match cli.command {
            Commands::ClearCache(cmd) => assert!(cmd.force),
            _ => panic!("Expected ClearCache command"),
        }
    }

    #[test]
    fn test_configure_command_parsing() {
        let cli = Cli::try_parse_from(["aws-cli-auth", "configure"]).unwrap();
        assert!(matches!(cli.command, Commands::Configure(_)));
    }

    #[test]
    fn test_completions_command_parsing() {
        let cli = Cli::try_parse_from(["aws-cli-auth", "completions", "bash"]).unwrap();
        assert!(matches!(cli.command, Commands::Completions(_)));
    }

    #[test]
    fn test_no_command_shows_help() {
        let result = Cli::try_parse_from(["aws-cli-auth"]);
        assert!(result.is_err());
        if let Err(e) = result {
            assert_eq!(
                e.kind(),
                ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
            );
        }
    }

    #[test]
    fn test_command_structure_validation() {
        let cmd = Cli::command();
        cmd.debug_assert();
    }

    #[test]
    fn test_invalid_command_fails() {
        let result = Cli::try_parse_from(["aws-cli-auth", "invalid"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_help_flag_works() {
        let result = Cli::try_parse_from(["aws-cli-auth", "--help"]);
        assert!(result.is_err());
        if let Err(e) = result {
            assert_eq!(e.kind(), ErrorKind::DisplayHelp);
        }
    }

    #[test]
    fn test_version_flag_works() {
        let result = Cli::try_parse_from(["aws-cli-auth", "--version"]);
        assert!(result.is_err());
        if let Err(e) = result {
            assert_eq!(e.kind(), ErrorKind::DisplayVersion);
        }
    }

    #[test]
    fn test_verbose_flag_multiple() {
        let cli = Cli::try_parse_from(["aws-cli-auth", "-vvv", "saml"]).unwrap();
        assert_eq!(cli.verbose, 3);
    }

    #[test]
    fn test_verbose_default_zero() {
        let cli = Cli::try_parse_from(["aws-cli-auth", "saml"]).unwrap();
        assert_eq!(cli.verbose, 0);
    }
}
