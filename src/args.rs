use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use clap::Parser;

#[derive(Parser, Debug)]
pub struct Args {
    /// Whether clients connect to mpds over https.
    /// If so, the auth cookie is sent as a secure cookie.
    #[arg(short, long, env = "MPDS_SECURE")]
    secure: bool,

    /// The address mpds should listen on. By default
    /// mpds will listen just on the IPv4 loopback.
    #[arg(short, long, env = "MPDS_ADDRESS")]
    address: Option<String>,

    /// The port mpds listens on.
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// Where the database and uploaded icons live.
    #[arg(long, env = "MPDS_DATA_DIR", default_value = ".")]
    data_dir: PathBuf,

    /// Static site files; `public/` is served as-is and `md/docs.md`
    /// is rendered at `/docs`.
    #[arg(long, env = "MPDS_WEB_DIR", default_value = "web")]
    web_dir: PathBuf,
}

impl Args {
    pub fn addr(&self) -> Result<SocketAddr, AddrParseError> {
        self.address
            .as_deref()
            .unwrap_or("127.0.0.1")
            .parse()
            .map(|addr: IpAddr| (addr, self.port).into())
    }

    pub fn secure(&self) -> bool {
        self.secure
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn public_dir(&self) -> PathBuf {
        self.web_dir.join("public")
    }

    pub fn docs_file(&self) -> PathBuf {
        self.web_dir.join("md").join("docs.md")
    }

    pub fn icons_dir(&self) -> PathBuf {
        self.data_dir.join("uploads").join("icons")
    }

    pub fn placeholder_icon(&self) -> PathBuf {
        self.public_dir().join("img").join("temp.jpg")
    }
}
