//! Actions that install or remove software inside the machine.

use crate::action::Action;
use crate::types::Database;

/// Default cloud-init payload for `launch`.
///
/// Installs nginx, docker and the PHP repository, and writes the nginx site
/// template whose placeholders the site sequencer substitutes.
pub const CLOUD_INIT: &str = r#"#cloud-config
packages:
  - redis
  - jq
  - apt-transport-https
  - ca-certificates
  - curl
  - gnupg-agent
  - software-properties-common
  - sshfs
write_files:
  - path: /opt/devbox/nginx/template.conf
    content: |
      server {
          listen 80;
          listen [::]:80;

          root CHANGEWEBROOTDIR/CHANGEPUBLICDIR;

          index index.php;
          gzip_static  on;
          error_page 404 /index.php?$query_string;
          ssi on;
          server_name CHANGESERVERNAME;

          location / {
              try_files $uri $uri/ /index.php$is_args$args;
          }

          location ~ \.php$ {
             include snippets/fastcgi-php.conf;
             fastcgi_pass unix:/var/run/php/phpCHANGEPHPVERSION-fpm.sock;
             fastcgi_read_timeout 240;
          }
      }
runcmd:
  - sudo add-apt-repository -y ppa:nginx/stable
  - sudo add-apt-repository -y ppa:ondrej/php
  - curl -fsSL https://download.docker.com/linux/ubuntu/gpg | sudo apt-key add -
  - sudo add-apt-repository "deb [arch=amd64] https://download.docker.com/linux/ubuntu $(lsb_release -cs) stable"
  - sudo apt-get update -y
  - sudo apt install -y nginx docker-ce docker-ce-cli containerd.io
  - sudo usermod -aG docker ubuntu
  - sudo rm -f /etc/nginx/sites-enabled/default
  - sudo mkdir -p /devbox/sites
  - sudo chown -R ubuntu:ubuntu /devbox/sites
"#;

/// PHP extensions installed alongside each version.
const PHP_EXTENSIONS: &[&str] = &[
    "mbstring", "cli", "curl", "fpm", "gd", "intl", "json", "mysql", "opcache", "pgsql", "zip",
    "xml",
];

/// Tools switched with `update-alternatives` when the version changes.
const PHP_ALTERNATIVES: &[&str] = &["php", "phar", "phar.phar", "phpize", "php-config"];

/// Apt packages for one PHP version.
pub fn php_packages(version: &str) -> Vec<String> {
    let mut packages = vec![format!("php{version}")];
    packages.extend(PHP_EXTENSIONS.iter().map(|ext| format!("php{version}-{ext}")));
    packages.push("php-xdebug".to_string());
    packages.push("php-imagick".to_string());
    packages
}

/// Install `version` and make it the default `php`.
pub fn install_php(machine: &str, version: &str) -> Vec<Action> {
    let install = ["apt-get", "install", "-y"]
        .into_iter()
        .map(str::to_string)
        .chain(php_packages(version));
    let mut actions = vec![Action::sudo(machine, install)];

    for tool in PHP_ALTERNATIVES {
        actions.push(Action::sudo(
            machine,
            [
                "update-alternatives".to_string(),
                "--set".to_string(),
                (*tool).to_string(),
                format!("/usr/bin/{tool}{version}"),
            ],
        ));
    }
    actions
}

/// Create the data volume and start the database container.
pub fn create_database(machine: &str, database: &Database) -> Vec<Action> {
    let name = database.name();
    let engine = database.engine;

    let mut run = vec![
        "docker".to_string(),
        "run".to_string(),
        "-v".to_string(),
        format!("{name}:{}", engine.data_path()),
        "--name".to_string(),
        name.clone(),
        "-d".to_string(),
        "--restart=always".to_string(),
        "-p".to_string(),
        format!("{}:{}", database.port, engine.container_port()),
    ];
    for var in engine.environment() {
        run.push("-e".to_string());
        run.push((*var).to_string());
    }
    run.push(database.image());

    vec![
        Action::exec(machine, ["docker", "volume", "create", name.as_str()]),
        Action::exec(machine, run),
    ]
}

/// Force-remove the database container and its anonymous volumes.
///
/// The named data volume is kept so re-adding the database restores its data.
pub fn remove_database(machine: &str, database: &Database) -> Action {
    Action::exec(
        machine,
        ["docker".to_string(), "rm".to_string(), "-v".to_string(), database.name(), "-f".to_string()],
    )
}

/// Start a database container that exists but is stopped.
pub fn start_database(machine: &str, database: &Database) -> Action {
    Action::exec(
        machine,
        ["docker".to_string(), "start".to_string(), database.name()],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Engine;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_php_packages() {
        let packages = php_packages("7.4");
        assert_eq!(packages.first().map(String::as_str), Some("php7.4"));
        assert!(packages.contains(&"php7.4-fpm".to_string()));
        assert_eq!(packages.last().map(String::as_str), Some("php-imagick"));
        assert_eq!(packages.len(), 15);
    }

    #[test]
    fn test_install_php_sets_alternatives() {
        let actions = install_php("dev", "7.3");
        assert_eq!(actions.len(), 6);
        assert_eq!(
            actions[1].args(),
            ["exec", "dev", "--", "sudo", "update-alternatives", "--set", "php", "/usr/bin/php7.3"]
        );
        assert_eq!(
            actions[5].args(),
            [
                "exec",
                "dev",
                "--",
                "sudo",
                "update-alternatives",
                "--set",
                "php-config",
                "/usr/bin/php-config7.3"
            ]
        );
    }

    #[test]
    fn test_create_postgres() {
        let db = Database::new(Engine::Postgres, "11.7", 5432);
        let actions = create_database("dev", &db);
        assert_eq!(
            actions[0].args(),
            ["exec", "dev", "--", "docker", "volume", "create", "postgres_11.7_5432"]
        );
        assert_eq!(
            actions[1].args(),
            [
                "exec",
                "dev",
                "--",
                "docker",
                "run",
                "-v",
                "postgres_11.7_5432:/var/lib/postgresql/data",
                "--name",
                "postgres_11.7_5432",
                "-d",
                "--restart=always",
                "-p",
                "5432:5432",
                "-e",
                "POSTGRES_USER=devbox",
                "-e",
                "POSTGRES_DB=devbox",
                "-e",
                "POSTGRES_PASSWORD=devbox",
                "postgres:11.7"
            ]
        );
    }

    #[test]
    fn test_mysql_maps_host_port() {
        let db = Database::new(Engine::Mysql, "5.7", 33061);
        let run = &create_database("dev", &db)[1];
        assert!(run.args().contains(&"33061:3306".to_string()));
        assert_eq!(run.args().last().map(String::as_str), Some("mysql:5.7"));
    }

    #[test]
    fn test_remove_database() {
        let db = Database::new(Engine::Mysql, "5.7", 3306);
        assert_eq!(
            remove_database("dev", &db).args(),
            ["exec", "dev", "--", "docker", "rm", "-v", "mysql_5.7_3306", "-f"]
        );
    }

    #[test]
    fn test_start_database() {
        let db = Database::new(Engine::Postgres, "11.7", 5432);
        assert_eq!(
            start_database("dev", &db).args(),
            ["exec", "dev", "--", "docker", "start", "postgres_11.7_5432"]
        );
    }

    #[test]
    fn test_cloud_init_carries_template_placeholders() {
        for placeholder in [
            crate::sequence::PLACEHOLDER_WEBROOT,
            crate::sequence::PLACEHOLDER_SERVER_NAME,
            crate::sequence::PLACEHOLDER_PUBLIC_DIR,
            crate::sequence::PLACEHOLDER_PHP_VERSION,
        ] {
            assert!(CLOUD_INIT.contains(placeholder), "{placeholder}");
        }
    }
}
