use std::path::PathBuf;

use env_logger::Env;
use structopt::StructOpt;

use dropsync::client::{ClientError, RemoteClient};
use dropsync::context::Context;
use dropsync::error::Error;
use dropsync::sync::Syncer;

#[derive(StructOpt, Debug)]
#[structopt(
    name = "dropsync",
    about = "One-way sync of a local directory to a Dropbox folder"
)]
struct Opt {
    /// Local directory to upload
    #[structopt(parse(from_os_str))]
    source: PathBuf,

    /// Destination path in the remote account
    destination: String,

    /// Access token (see https://www.dropbox.com/developers/apps)
    #[structopt(short = "t", long = "token")]
    token: String,
}

fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let opt = Opt::from_args();

    let context = Context::new(opt.source, opt.destination, opt.token)?;
    let client = context.client()?;

    // Fail before walking anything if the token is unusable
    match client.check_credentials() {
        Ok(account) => log::info!("Authenticated as {}", account),
        Err(ClientError::Authentication) => return Err(Error::AuthenticationFailed),
        Err(error) => return Err(Error::Client(error)),
    }

    log::info!(
        "Sync {} to {}",
        context.folder_path.display(),
        context.remote_path
    );
    let report = Syncer::new(&client, &context.folder_path, &context.remote_path).sync()?;
    log::info!(
        "Done: {} examined, {} uploaded, {} skipped, {} errors",
        report.examined,
        report.uploaded,
        report.skipped,
        report.errors
    );

    Ok(())
}
