pub mod http;
pub mod mqtt;

pub use http::{HttpGatewayRegistry, SensorThingsHttp};
pub use mqtt::{MqttBrokerRegistry, MqttConnection};
