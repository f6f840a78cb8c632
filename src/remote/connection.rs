// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::ffi::OsString;
use std::fmt;
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

use crate::config::{Credential, RemoteConfig};

const SSHPASS_ENV: &str = "SSHPASS";

/// A fully described external command, ready to be spawned
#[derive(Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<OsString>,
    /// Extra environment for the child only
    pub env: Vec<(String, String)>,
}

impl Invocation {
    pub fn into_command(self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(self.env)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        command
    }
}

// Environment values may hold the password
impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env_keys: Vec<&str> = self.env.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("Invocation")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("env", &env_keys)
            .finish()
    }
}

/// Connection settings with the credential already turned into arguments
#[derive(Clone)]
pub struct ConnectionParams {
    host: String,
    user: String,
    port: u16,
    ssh_program: String,
    scp_program: String,
    /// `sshpass -e` when authenticating with a password
    launcher: Vec<String>,
    /// `-i <key>` when authenticating with a key
    identity: Vec<OsString>,
    env: Vec<(String, String)>,
}

impl ConnectionParams {
    pub fn new(config: &RemoteConfig) -> Self {
        let (launcher, identity, env) = match &config.credential {
            Credential::Key(path) => (
                Vec::new(),
                vec![OsString::from("-i"), path.as_os_str().to_os_string()],
                Vec::new(),
            ),
            Credential::Password(secret) => (
                vec!["sshpass".to_string(), "-e".to_string()],
                Vec::new(),
                vec![(SSHPASS_ENV.to_string(), secret.clone())],
            ),
        };

        Self {
            host: config.host.clone(),
            user: config.user.clone(),
            port: config.port,
            ssh_program: "ssh".to_string(),
            scp_program: "scp".to_string(),
            launcher,
            identity,
            env,
        }
    }

    /// Run other executables in place of `ssh` and `scp`
    pub fn with_programs(mut self, ssh: impl Into<String>, scp: impl Into<String>) -> Self {
        self.ssh_program = ssh.into();
        self.scp_program = scp.into();
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// `user@host`
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// Run `remote_command` on the remote host through ssh
    pub fn ssh(&self, remote_command: &str) -> Invocation {
        let mut args: Vec<OsString> = vec![
            "-o".into(),
            "StrictHostKeyChecking=no".into(),
            "-p".into(),
            self.port.to_string().into(),
        ];
        args.extend(self.identity.iter().cloned());
        args.push(self.destination().into());
        args.push(remote_command.into());

        self.wrap(&self.ssh_program, args)
    }

    /// Copy `local` into `remote_dir` on the remote host.
    ///
    /// The target is passed unquoted: scp in SFTP mode takes it literally.
    pub fn scp(&self, local: &Path, remote_dir: &str) -> Invocation {
        let mut args: Vec<OsString> = vec![
            "-o".into(),
            "StrictHostKeyChecking=no".into(),
            "-P".into(),
            self.port.to_string().into(),
        ];
        args.extend(self.identity.iter().cloned());
        args.push(local.as_os_str().to_os_string());
        args.push(format!("{}:{}/", self.destination(), remote_dir).into());

        self.wrap(&self.scp_program, args)
    }

    fn wrap(&self, tool: &str, tool_args: Vec<OsString>) -> Invocation {
        let (program, mut args) = match self.launcher.split_first() {
            Some((launcher, launcher_args)) => (
                launcher.clone(),
                launcher_args
                    .iter()
                    .map(OsString::from)
                    .chain(std::iter::once(OsString::from(tool)))
                    .collect::<Vec<_>>(),
            ),
            None => (tool.to_string(), Vec::new()),
        };
        args.extend(tool_args);

        Invocation {
            program,
            args,
            env: self.env.clone(),
        }
    }
}

/// Single-quote a value for a POSIX shell on the remote side
pub fn sh_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn remote(credential: Credential) -> RemoteConfig {
        RemoteConfig {
            host: "archive.example.com".to_string(),
            port: 2222,
            user: "archiver".to_string(),
            credential,
            path: "Drachenlord Archiv".to_string(),
        }
    }

    fn args(invocation: &Invocation) -> Vec<String> {
        invocation
            .args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn ssh_with_key_uses_identity_file() {
        let params = ConnectionParams::new(&remote(Credential::Key(PathBuf::from(
            "/home/me/.ssh/id_ed25519",
        ))));

        let invocation = params.ssh("ls -1");

        assert_eq!(invocation.program, "ssh");
        assert_eq!(
            args(&invocation),
            vec![
                "-o",
                "StrictHostKeyChecking=no",
                "-p",
                "2222",
                "-i",
                "/home/me/.ssh/id_ed25519",
                "archiver@archive.example.com",
                "ls -1",
            ]
        );
        assert!(invocation.env.is_empty());
    }

    #[test]
    fn ssh_with_password_goes_through_sshpass() {
        let params = ConnectionParams::new(&remote(Credential::Password("s3cret".to_string())));

        let invocation = params.ssh("ls -1");

        assert_eq!(invocation.program, "sshpass");
        assert_eq!(
            args(&invocation),
            vec![
                "-e",
                "ssh",
                "-o",
                "StrictHostKeyChecking=no",
                "-p",
                "2222",
                "archiver@archive.example.com",
                "ls -1",
            ]
        );
        assert_eq!(
            invocation.env,
            vec![("SSHPASS".to_string(), "s3cret".to_string())]
        );
    }

    #[test]
    fn scp_uses_capital_port_flag_and_literal_target() {
        let params = ConnectionParams::new(&remote(Credential::Key(PathBuf::from("/k"))));

        let invocation = params.scp(Path::new("/tmp/work/Ep 1.webm"), "Drachenlord Archiv");

        assert_eq!(invocation.program, "scp");
        assert_eq!(
            args(&invocation),
            vec![
                "-o",
                "StrictHostKeyChecking=no",
                "-P",
                "2222",
                "-i",
                "/k",
                "/tmp/work/Ep 1.webm",
                "archiver@archive.example.com:Drachenlord Archiv/",
            ]
        );
    }

    #[test]
    fn scp_target_carries_no_shell_quotes() {
        let params = ConnectionParams::new(&remote(Credential::Key(PathBuf::from("/k"))));

        let invocation = params.scp(Path::new("/tmp/w/Ep.webm"), "My Archive");
        let target = args(&invocation).pop().unwrap();

        assert_eq!(target, "archiver@archive.example.com:My Archive/");
        assert!(!target.contains('\''));
        assert!(!target.contains('"'));
    }

    #[test]
    fn program_override_keeps_the_launcher() {
        let params = ConnectionParams::new(&remote(Credential::Password("pw".to_string())))
            .with_programs("/opt/ssh", "/opt/scp");

        assert_eq!(&args(&params.ssh("true"))[..2], &["-e", "/opt/ssh"]);
        assert_eq!(
            &args(&params.scp(Path::new("a.webm"), "dir"))[..2],
            &["-e", "/opt/scp"]
        );
    }

    #[test]
    fn scp_with_password_goes_through_sshpass() {
        let params = ConnectionParams::new(&remote(Credential::Password("pw".to_string())));

        let invocation = params.scp(Path::new("a.webm"), "dir");

        assert_eq!(invocation.program, "sshpass");
        assert_eq!(&args(&invocation)[..2], &["-e", "scp"]);
        assert!(!args(&invocation).contains(&"-i".to_string()));
    }

    #[test]
    fn debug_output_hides_password() {
        let params = ConnectionParams::new(&remote(Credential::Password("s3cret".to_string())));
        let debug = format!("{:?}", params.ssh("true"));

        assert!(debug.contains("SSHPASS"));
        assert!(!debug.contains("s3cret"));
    }

    #[test]
    fn sh_quote_escapes_single_quotes() {
        assert_eq!(sh_quote("plain"), "'plain'");
        assert_eq!(sh_quote("with space"), "'with space'");
        assert_eq!(sh_quote("it's"), r"'it'\''s'");
    }
}
