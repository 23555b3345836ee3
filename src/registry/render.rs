use super::ServiceMap;
use crate::types::{format_timestamp, ServiceInstance};

const END: &str = "\n";
const TAB: &str = "    ";

#[allow(clippy::too_many_arguments)]
fn status_row(
    state: &str,
    name: &str,
    host: &str,
    port: &str,
    id: &str,
    v_nodes: &str,
    ping: &str,
    ts: &str,
    time: &str,
) -> String {
    format!(
        "{:<15}{:<15}{:<16}{:<15}{:<15}{:<15}{:<15}{:<15}{:<15}\n",
        state, name, host, port, id, v_nodes, ping, ts, time
    )
}

fn instance_row(instance: &ServiceInstance) -> String {
    status_row(
        instance.state.as_str(),
        &instance.service_name,
        &instance.host,
        &instance.port.to_string(),
        &instance.id.to_string(),
        &instance.v_nodes.to_string(),
        &instance.ping_frequency.to_string(),
        &instance.timestamp.to_string(),
        &format_timestamp(instance.timestamp),
    )
}

/// Fixed-width table of every instance, grouped by service. Tombstones are shown.
pub(super) fn service_status(services: &ServiceMap) -> String {
    let mut out = String::new();
    out.push_str(&status_row(
        "STATE",
        "SERVICENAME",
        "HOST",
        "PORT",
        "ID",
        "VNODES",
        "PINGFREQUENCY",
        "TIMESTAMP",
        "TIME",
    ));
    for (name, bucket) in services {
        out.push_str(END);
        if bucket.is_empty() {
            out.push_str(&format!("{} EMPTY !{}", name, END));
            continue;
        }
        for instance in bucket.values() {
            out.push_str(&instance_row(instance));
        }
    }
    out
}

/// Plain `name host port pingFrequency` listing, one section per service.
pub(super) fn service_list(services: &ServiceMap, now_millis: u64) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {}{}", format_timestamp(now_millis), END));
    out.push_str("# serviceName host port pingFrequency");
    out.push_str(END);
    out.push_str(END);
    for (name, bucket) in services.iter().filter(|(_, bucket)| !bucket.is_empty()) {
        out.push_str(&format!("# {}{}", name, END));
        for instance in bucket.values() {
            out.push_str(&format!(
                "{}{TAB}{}{TAB}{}{TAB}{}{END}",
                instance.service_name, instance.host, instance.port, instance.ping_frequency
            ));
        }
        out.push_str(END);
    }
    out
}

pub fn help_online() -> String {
    let mut out = String::with_capacity(500);
    out.push_str("SYNOPSIS\n");
    out.push_str(TAB);
    out.push_str("string serviceName, string host, int port, int pingFrequency\n\n");
    out.push_str("OPTIONS\n");
    for line in [
        "serviceName : service name of this node provides",
        "host : the dst node's host or ip",
        "port : the dst node's port",
        "pingFrequency : the frequency of ping (s), clamped to [10, 60]",
    ] {
        out.push_str(TAB);
        out.push_str(line);
        out.push_str(END);
    }
    out
}

pub fn help_offline() -> String {
    let mut out = String::with_capacity(500);
    out.push_str("SYNOPSIS\n");
    out.push_str(TAB);
    out.push_str("string serviceName, long id\n\n");
    out.push_str("OPTIONS\n");
    out.push_str(TAB);
    out.push_str("serviceName : service name\n");
    out.push_str(TAB);
    out.push_str("id : uniquely identifies of node, see serviceStatus\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::State;
    use std::collections::BTreeMap;

    fn map_with(state: State) -> ServiceMap {
        let instance = ServiceInstance {
            service_name: "search".to_string(),
            id: 7,
            host: "10.1.0.1".to_string(),
            port: 9000,
            ping_frequency: 15,
            state,
            timestamp: 0,
            v_nodes: 2,
        };
        let mut services = BTreeMap::new();
        services.insert("search".to_string(), BTreeMap::from([(7, instance)]));
        services.insert("empty".to_string(), BTreeMap::new());
        services
    }

    #[test]
    fn test_status_shows_tombstones_and_empty_buckets() {
        let status = service_status(&map_with(State::Tombstone1));
        assert!(status.starts_with("STATE"));
        assert!(status.contains("Tombstone_1"));
        assert!(status.contains("empty EMPTY !"));
    }

    #[test]
    fn test_list_skips_empty_services() {
        let list = service_list(&map_with(State::Up), 0);
        assert!(list.contains("# search\n"));
        assert!(list.contains("search    10.1.0.1    9000    15\n"));
        assert!(!list.contains("# empty"));
    }

    #[test]
    fn test_help_texts() {
        assert!(help_online().contains("pingFrequency"));
        assert!(help_offline().starts_with("SYNOPSIS"));
    }
}
