error_chain! {
    errors {
        EncodingError {
            description("failed to encode ICMP message")
            display("failed to encode ICMP message")
        }
        DecodingError(reason: String) {
            description("failed to decode ICMP message")
            display("failed to decode ICMP message: {}", reason)
        }
        OpenSessionError {
            description("failed to open raw ICMP socket")
            display("failed to open raw ICMP socket")
        }
        InvalidArgument(name: String, reason: String) {
            description("invalid argument")
            display("invalid value for '{}': {}", name, reason)
        }
    }

    foreign_links {
        IOError(::std::io::Error);
    }
}
