//! Line commands of the interactive peers.

use crate::error::{Error, Result};
use std::time::Duration;

pub const SENSOR_USAGE: &str = "\
Commands:
  -register <name> <location> [tags...]
  -whoami
  -startstream [period_ms] [token]
  -endstream
  -quit";

pub const SUBSCRIBER_USAGE: &str = "\
Commands:
  -register <login> <password> <email>
  -login <login> <password>
  -list
  -history <sensorId> <depth>
  -subscribeon <sensorId>
  -unsubscribefrom <sensorId>
  -disconnect
  -quit";

#[derive(Debug, Clone, PartialEq)]
pub enum SensorLine {
    Empty,
    Register {
        name: String,
        location: String,
        tags: Vec<String>,
    },
    WhoAmI,
    StartStream {
        period: Option<Duration>,
        token: Option<String>,
    },
    EndStream,
    Quit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubscriberLine {
    Empty,
    Register {
        login: String,
        password: String,
        email: String,
    },
    Login {
        login: String,
        password: String,
    },
    List,
    History {
        sensor_id: String,
        depth: i32,
    },
    SubscribeOn(String),
    UnsubscribeFrom(String),
    Disconnect,
    Quit,
}

fn usage(usage: &str) -> Error {
    Error::Usage(usage.to_string())
}

pub fn parse_sensor_line(line: &str) -> Result<SensorLine> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(SensorLine::Empty);
    };
    let args: Vec<&str> = words.collect();

    match (command, args.as_slice()) {
        ("-register", [name, location, tags @ ..]) => Ok(SensorLine::Register {
            name: name.to_string(),
            location: location.to_string(),
            tags: tags.iter().map(|tag| tag.to_string()).collect(),
        }),
        ("-whoami", []) => Ok(SensorLine::WhoAmI),
        ("-startstream", rest) if rest.len() <= 2 => {
            let period = match rest.first() {
                Some(ms) => match ms.parse::<u64>() {
                    Ok(ms) if ms > 0 => Some(Duration::from_millis(ms)),
                    _ => return Err(usage(SENSOR_USAGE)),
                },
                None => None,
            };
            Ok(SensorLine::StartStream {
                period,
                token: rest.get(1).map(|token| token.to_string()),
            })
        }
        ("-endstream", []) => Ok(SensorLine::EndStream),
        ("-quit", []) => Ok(SensorLine::Quit),
        _ => Err(usage(SENSOR_USAGE)),
    }
}

pub fn parse_subscriber_line(line: &str) -> Result<SubscriberLine> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(SubscriberLine::Empty);
    };
    let args: Vec<&str> = words.collect();

    match (command, args.as_slice()) {
        ("-register", [login, password, email]) => Ok(SubscriberLine::Register {
            login: login.to_string(),
            password: password.to_string(),
            email: email.to_string(),
        }),
        ("-login", [login, password]) => Ok(SubscriberLine::Login {
            login: login.to_string(),
            password: password.to_string(),
        }),
        ("-list", []) => Ok(SubscriberLine::List),
        ("-history", [sensor_id, depth]) => match depth.parse::<i32>() {
            Ok(depth) => Ok(SubscriberLine::History {
                sensor_id: sensor_id.to_string(),
                depth,
            }),
            Err(_) => Err(usage(SUBSCRIBER_USAGE)),
        },
        ("-subscribeon", [sensor_id]) => Ok(SubscriberLine::SubscribeOn(sensor_id.to_string())),
        ("-unsubscribefrom", [sensor_id]) => {
            Ok(SubscriberLine::UnsubscribeFrom(sensor_id.to_string()))
        }
        ("-disconnect", []) => Ok(SubscriberLine::Disconnect),
        ("-quit", []) => Ok(SubscriberLine::Quit),
        _ => Err(usage(SUBSCRIBER_USAGE)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_register_with_tags() {
        assert_eq!(
            parse_sensor_line("-register temp-1 lab indoor celsius").unwrap(),
            SensorLine::Register {
                name: "temp-1".into(),
                location: "lab".into(),
                tags: vec!["indoor".into(), "celsius".into()],
            }
        );
        assert_eq!(
            parse_sensor_line("  -register temp-1 lab ").unwrap(),
            SensorLine::Register {
                name: "temp-1".into(),
                location: "lab".into(),
                tags: vec![],
            }
        );
    }

    #[test]
    fn test_sensor_startstream_arguments() {
        assert_eq!(
            parse_sensor_line("-startstream").unwrap(),
            SensorLine::StartStream {
                period: None,
                token: None
            }
        );
        assert_eq!(
            parse_sensor_line("-startstream 250 abc.def").unwrap(),
            SensorLine::StartStream {
                period: Some(Duration::from_millis(250)),
                token: Some("abc.def".into()),
            }
        );
        assert!(parse_sensor_line("-startstream 0").is_err());
        assert!(parse_sensor_line("-startstream soon").is_err());
    }

    #[test]
    fn test_sensor_unknown_line_is_usage() {
        let err = parse_sensor_line("-register onlyname").unwrap_err();
        assert_eq!(err.to_string(), SENSOR_USAGE);
        assert!(parse_sensor_line("hello").is_err());
        assert_eq!(parse_sensor_line("   ").unwrap(), SensorLine::Empty);
        assert_eq!(parse_sensor_line("-quit").unwrap(), SensorLine::Quit);
    }

    #[test]
    fn test_subscriber_commands() {
        assert_eq!(
            parse_subscriber_line("-login alice secret").unwrap(),
            SubscriberLine::Login {
                login: "alice".into(),
                password: "secret".into(),
            }
        );
        assert_eq!(
            parse_subscriber_line("-history 1234 5").unwrap(),
            SubscriberLine::History {
                sensor_id: "1234".into(),
                depth: 5,
            }
        );
        assert_eq!(
            parse_subscriber_line("-subscribeon 1234").unwrap(),
            SubscriberLine::SubscribeOn("1234".into())
        );
        assert_eq!(
            parse_subscriber_line("-unsubscribefrom 1234").unwrap(),
            SubscriberLine::UnsubscribeFrom("1234".into())
        );
        assert_eq!(parse_subscriber_line("-disconnect").unwrap(), SubscriberLine::Disconnect);
    }

    #[test]
    fn test_subscriber_rejects_malformed_lines() {
        assert!(parse_subscriber_line("-register alice secret").is_err());
        assert!(parse_subscriber_line("-history 1234 many").is_err());
        assert!(parse_subscriber_line("-list everything").is_err());
        let err = parse_subscriber_line("-subscribe 1234").unwrap_err();
        assert_eq!(err.to_string(), SUBSCRIBER_USAGE);
    }
}
