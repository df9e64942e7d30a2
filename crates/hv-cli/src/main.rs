//! `hv` - command-line client for the hypervisor control plane.

mod client;
mod console;
mod error;
mod output;

use clap::{Parser, Subcommand};
use error::CliError;

/// Command-line client for the hypervisor control plane.
#[derive(Parser, Debug)]
#[command(name = "hv", author, version, about, long_about = None)]
struct Cli {
    /// Controller gRPC address.
    #[arg(long, env = "HV_CONTROLLER_ADDR", default_value = "http://127.0.0.1:7443", global = true)]
    controller: String,

    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Node registry operations.
    Node {
        #[command(subcommand)]
        action: NodeCommand,
    },
    /// Instance lifecycle operations.
    Instance {
        #[command(subcommand)]
        action: InstanceCommand,
    },
    /// Cluster-wide operations.
    Cluster {
        #[command(subcommand)]
        action: ClusterCommand,
    },
}

#[derive(Subcommand, Debug)]
enum NodeCommand {
    /// List registered nodes.
    List,
    /// Show a single node's full record.
    Get {
        /// Node id.
        node_id: String,
    },
    /// Mark a node as draining, refusing new placements.
    Drain {
        /// Node id.
        node_id: String,
    },
}

#[derive(Subcommand, Debug)]
enum InstanceCommand {
    /// Create an instance.
    Create {
        /// Human-readable name, unique per owner.
        name: String,
        /// Owner identity scoping name uniqueness.
        #[arg(long)]
        owner: String,
        /// Instance kind: vm, container, or microvm.
        #[arg(long)]
        kind: String,
        /// Image reference.
        #[arg(long)]
        image: String,
        /// Virtual CPU count.
        #[arg(long, default_value = "1")]
        vcpus: u32,
        /// Memory in bytes.
        #[arg(long, default_value = "536870912")]
        memory_bytes: u64,
    },
    /// Show a single instance's full record.
    Get {
        /// Instance id.
        instance_id: String,
    },
    /// List instances.
    List {
        /// Filter by owning node id.
        #[arg(long)]
        node: Option<String>,
    },
    /// Start a stopped instance.
    Start {
        /// Instance id.
        instance_id: String,
    },
    /// Stop a running instance.
    Stop {
        /// Instance id.
        instance_id: String,
        /// Skip graceful shutdown and terminate immediately.
        #[arg(long)]
        force: bool,
        /// Graceful shutdown timeout, in seconds.
        #[arg(long, default_value = "30")]
        timeout_seconds: u32,
    },
    /// Restart an instance.
    Restart {
        /// Instance id.
        instance_id: String,
        /// Skip graceful shutdown and terminate immediately before restart.
        #[arg(long)]
        force: bool,
    },
    /// Delete an instance.
    Delete {
        /// Instance id.
        instance_id: String,
        /// Delete even if the instance is still running.
        #[arg(long)]
        force: bool,
    },
    /// Attach a terminal to an instance's console.
    Console {
        /// Instance id.
        instance_id: String,
    },
    /// Show an instance's live runtime counters.
    Stats {
        /// Instance id.
        instance_id: String,
    },
}

#[derive(Subcommand, Debug)]
enum ClusterCommand {
    /// Show aggregate cluster counters.
    Info,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.debug {
        tracing_subscriber::fmt()
            .with_env_filter("hv_cli=debug,warn")
            .with_writer(std::io::stderr)
            .init();
    }

    let code = match run(cli).await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {err}");
            err.exit_code()
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut client = client::ControlClient::connect(&cli.controller).await?;

    match cli.command {
        Command::Node { action } => run_node(&mut client, action).await,
        Command::Instance { action } => run_instance(&mut client, action).await,
        Command::Cluster { action } => run_cluster(&mut client, action).await,
    }
}

async fn run_node(client: &mut client::ControlClient, action: NodeCommand) -> Result<(), CliError> {
    use hv_proto::v1::{
        GetNodeRequest, ListNodesRequest, NodeStatus, UpdateNodeStatusRequest,
    };

    match action {
        NodeCommand::List => {
            let response = client
                .cluster()
                .list_nodes(ListNodesRequest::default())
                .await?
                .into_inner();
            output::print_node_table(&response.nodes);
        }
        NodeCommand::Get { node_id } => {
            let response = client
                .cluster()
                .get_node(GetNodeRequest { node_id })
                .await?
                .into_inner();
            if let Some(node) = response.node {
                output::print_node_detail(&node);
            }
        }
        NodeCommand::Drain { node_id } => {
            let response = client
                .cluster()
                .update_node_status(UpdateNodeStatusRequest {
                    node_id,
                    status: NodeStatus::Draining as i32,
                })
                .await?
                .into_inner();
            if let Some(node) = response.node {
                output::print_node_detail(&node);
            }
        }
    }
    Ok(())
}

async fn run_instance(
    client: &mut client::ControlClient,
    action: InstanceCommand,
) -> Result<(), CliError> {
    use hv_proto::v1::{
        CreateInstanceRequest, DeleteInstanceRequest, GetInstanceRequest, GetInstanceStatsRequest,
        InstanceSpec, ListInstancesRequest, RestartInstanceRequest, StartInstanceRequest,
        StopInstanceRequest,
    };

    match action {
        InstanceCommand::Create { name, owner, kind, image, vcpus, memory_bytes } => {
            let kind = parse_instance_kind(&kind)?;
            let response = client
                .compute()
                .create_instance(CreateInstanceRequest {
                    name,
                    owner,
                    kind: kind as i32,
                    spec: Some(InstanceSpec { image, vcpus, memory_bytes, ..Default::default() }),
                    placement_prefs: None,
                    instance_id: String::new(),
                })
                .await?
                .into_inner();
            if let Some(instance) = response.instance {
                output::print_instance_detail(&instance);
            }
        }
        InstanceCommand::Get { instance_id } => {
            let response = client
                .compute()
                .get_instance(GetInstanceRequest { instance_id })
                .await?
                .into_inner();
            if let Some(instance) = response.instance {
                output::print_instance_detail(&instance);
            }
        }
        InstanceCommand::List { node } => {
            let response = client
                .compute()
                .list_instances(ListInstancesRequest {
                    state_filter: None,
                    node_filter: node,
                    page_size: 0,
                    page_token: String::new(),
                })
                .await?
                .into_inner();
            output::print_instance_table(&response.instances);
        }
        InstanceCommand::Start { instance_id } => {
            let response = client
                .compute()
                .start_instance(StartInstanceRequest { instance_id })
                .await?
                .into_inner();
            if let Some(instance) = response.instance {
                output::print_instance_detail(&instance);
            }
        }
        InstanceCommand::Stop { instance_id, force, timeout_seconds } => {
            let response = client
                .compute()
                .stop_instance(StopInstanceRequest { instance_id, force, timeout_seconds })
                .await?
                .into_inner();
            if let Some(instance) = response.instance {
                output::print_instance_detail(&instance);
            }
        }
        InstanceCommand::Restart { instance_id, force } => {
            let response = client
                .compute()
                .restart_instance(RestartInstanceRequest { instance_id, force })
                .await?
                .into_inner();
            if let Some(instance) = response.instance {
                output::print_instance_detail(&instance);
            }
        }
        InstanceCommand::Delete { instance_id, force } => {
            client
                .compute()
                .delete_instance(DeleteInstanceRequest { instance_id, force })
                .await?;
        }
        InstanceCommand::Stats { instance_id } => {
            let response = client
                .compute()
                .get_instance_stats(GetInstanceStatsRequest { instance_id })
                .await?
                .into_inner();
            if let Some(stats) = response.stats {
                output::print_instance_stats(&stats);
            }
        }
        InstanceCommand::Console { instance_id } => {
            attach_console(client, &instance_id).await?;
        }
    }
    Ok(())
}

async fn run_cluster(client: &mut client::ControlClient, action: ClusterCommand) -> Result<(), CliError> {
    use hv_proto::v1::GetClusterInfoRequest;

    match action {
        ClusterCommand::Info => {
            let info = client
                .cluster()
                .get_cluster_info(GetClusterInfoRequest {})
                .await?
                .into_inner();
            println!("node_count:         {}", info.node_count);
            println!("ready_node_count:   {}", info.ready_node_count);
            println!("instance_count:     {}", info.instance_count);
            println!("controller_version: {}", info.controller_version);
        }
    }
    Ok(())
}

fn parse_instance_kind(raw: &str) -> Result<hv_proto::v1::InstanceKind, CliError> {
    use hv_proto::v1::InstanceKind;
    match raw {
        "vm" => Ok(InstanceKind::Vm),
        "container" => Ok(InstanceKind::Container),
        "microvm" => Ok(InstanceKind::Microvm),
        other => Err(CliError::usage(format!("unknown instance kind: {other}"))),
    }
}

/// Resolve the instance's owning node address and attach a console.
async fn attach_console(client: &mut client::ControlClient, instance_id: &str) -> Result<(), CliError> {
    use hv_proto::v1::{GetInstanceRequest, GetNodeRequest};

    let instance = client
        .compute()
        .get_instance(GetInstanceRequest { instance_id: instance_id.to_string() })
        .await?
        .into_inner()
        .instance
        .ok_or_else(|| CliError::usage("instance has no record"))?;

    let node_id = instance
        .placement
        .ok_or_else(|| CliError::usage("instance is not yet placed on a node"))?;

    let node = client
        .cluster()
        .get_node(GetNodeRequest { node_id })
        .await?
        .into_inner()
        .node
        .ok_or_else(|| CliError::usage("node has no record"))?;

    console::attach(&format!("http://{}", node.address), instance_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn known_instance_kinds_parse() {
        assert_eq!(parse_instance_kind("vm").unwrap(), hv_proto::v1::InstanceKind::Vm);
        assert_eq!(parse_instance_kind("container").unwrap(), hv_proto::v1::InstanceKind::Container);
        assert_eq!(parse_instance_kind("microvm").unwrap(), hv_proto::v1::InstanceKind::Microvm);
    }

    #[test]
    fn unknown_instance_kind_is_a_usage_error() {
        let err = parse_instance_kind("potato").unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn node_subcommands_parse() {
        let cli = Cli::parse_from(["hv", "node", "drain", "n-1"]);
        match cli.command {
            Command::Node { action: NodeCommand::Drain { node_id } } => assert_eq!(node_id, "n-1"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn instance_create_subcommand_parses_flags() {
        let cli = Cli::parse_from([
            "hv", "instance", "create", "web-1", "--owner", "team-a", "--kind", "vm", "--image", "debian-12",
        ]);
        match cli.command {
            Command::Instance { action: InstanceCommand::Create { name, owner, kind, image, .. } } => {
                assert_eq!(name, "web-1");
                assert_eq!(owner, "team-a");
                assert_eq!(kind, "vm");
                assert_eq!(image, "debian-12");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
